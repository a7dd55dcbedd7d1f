#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sparkit_core::request::Asset;
use sparkit_core::sanitize::OutputSanitizer;
use sparkit_pipeline::{Collaborators, Orchestrator, PgTaskLedger, PipelineConfig, Workflow};
use sparkit_providers::{ImageGenerator, ImageOptions, ProviderError, TextGenerator, TextOptions};
use sparkit_storage::{CredentialCache, FallbackStore, StorageError, UploadPipeline};
use sqlx::PgPool;
use tower::ServiceExt;

use sparkit_api::config::ServerConfig;
use sparkit_api::middleware::owner::OWNER_KEY_HEADER;
use sparkit_api::router::build_app_router;
use sparkit_api::state::AppState;

pub const OWNER: &str = "owner-1";
pub const BOUNDARY: &str = "sparkit-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_body_bytes: 1024 * 1024,
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Describes two poses for every request.
pub struct TwoPoses;

#[async_trait]
impl TextGenerator for TwoPoses {
    async fn generate_text(
        &self,
        _prompt: &str,
        _image: Option<&Asset>,
        _options: &TextOptions,
    ) -> Result<String, ProviderError> {
        Ok("- Pose1: arms crossed by the window\n\
            - Camera Position1: eye level\n\
            - Composition1: centered\n\
            - Pose2: sitting on the stairs\n\
            - Camera Position2: low angle\n\
            - Composition2: rule of thirds\n"
            .to_string())
    }
}

pub struct EchoImage;

#[async_trait]
impl ImageGenerator for EchoImage {
    async fn generate_image(
        &self,
        _prompt: &str,
        images: &[Asset],
        _options: &ImageOptions,
    ) -> Result<Asset, ProviderError> {
        images
            .first()
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 400,
                body: "no input image".into(),
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub filenames: Mutex<Vec<String>>,
}

#[async_trait]
impl FallbackStore for MemoryStore {
    async fn upload(
        &self,
        _bytes: &[u8],
        _media_type: &str,
        filename: &str,
    ) -> Result<String, StorageError> {
        self.filenames.lock().unwrap().push(filename.to_string());
        Ok(format!("https://assets.test/{filename}"))
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Build the full application router over `pool`, with fake generators and
/// an in-memory asset store behind the real PostgreSQL ledger.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();

    let uploads = UploadPipeline::new(
        None,
        Some(Arc::new(MemoryStore::default()) as Arc<dyn FallbackStore>),
        Arc::new(CredentialCache::new()),
    );
    let collaborators = Collaborators {
        text: Arc::new(TwoPoses),
        image: Arc::new(EchoImage),
        fast: None,
        uploads,
        ledger: Arc::new(PgTaskLedger::new(pool.clone())),
    };
    let orchestrator = Orchestrator::new(
        collaborators,
        Workflow::builtin().unwrap(),
        PipelineConfig::default(),
        OutputSanitizer::default(),
    );

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator: Arc::new(orchestrator),
    };

    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

/// Send a bodiless request carrying the owner header.
pub async fn as_owner(app: Router, method: Method, uri: &str, owner: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(OWNER_KEY_HEADER, owner)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

/// One part of a hand-built `multipart/form-data` body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, media_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.bin\"\r\n\
                         Content-Type: {media_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(
    app: Router,
    uri: &str,
    owner: Option<&str>,
    parts: &[Part<'_>],
) -> Response {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(owner) = owner {
        builder = builder.header(OWNER_KEY_HEADER, owner);
    }
    let request = builder.body(Body::from(multipart_body(parts))).unwrap();
    send(app, request).await
}

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
