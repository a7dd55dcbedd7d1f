//! Client for the low-latency render backend.
//!
//! The backend runs a fixed image-edit workflow on a single GPU slot. A call
//! posts the source image, prompt and seed as JSON and gets one base64 image
//! back in a `{ code, data: { image } }` envelope.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sparkit_core::request::Asset;

use crate::error::ProviderError;
use crate::generate::FastImageGenerator;

/// Default per-call timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Fast backend configuration.
#[derive(Debug, Clone)]
pub struct FastRenderConfig {
    pub api_url: String,
    /// Opaque workflow payload forwarded with every call.
    pub workflow: Option<String>,
    pub timeout_secs: u64,
}

impl FastRenderConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` when `FAST_RENDER_URL` is unset, which disables the
    /// `fast` backend.
    ///
    /// | Env Var                    | Default     |
    /// |----------------------------|-------------|
    /// | `FAST_RENDER_URL`          | (optional)  |
    /// | `FAST_RENDER_WORKFLOW`     | (optional)  |
    /// | `FAST_RENDER_TIMEOUT_SECS` | `180`       |
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("FAST_RENDER_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())?;

        let timeout_secs: u64 = std::env::var("FAST_RENDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .expect("FAST_RENDER_TIMEOUT_SECS must be a valid u64");

        Some(Self {
            api_url,
            workflow: std::env::var("FAST_RENDER_WORKFLOW").ok(),
            timeout_secs,
        })
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<&'a str>,
    image: String,
    prompt: &'a str,
    seed: u64,
    output_image: &'static str,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<RenderData>,
}

#[derive(Debug, Deserialize)]
struct RenderData {
    image: Option<String>,
}

/// HTTP client for the fast render backend.
pub struct FastRenderClient {
    client: reqwest::Client,
    config: FastRenderConfig,
}

impl FastRenderClient {
    pub fn new(config: FastRenderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl FastImageGenerator for FastRenderClient {
    async fn generate_fast(
        &self,
        image: &Asset,
        prompt: &str,
        seed: u64,
    ) -> Result<Asset, ProviderError> {
        let body = RenderRequest {
            workflow: self.config.workflow.as_deref(),
            image: BASE64.encode(&image.bytes),
            prompt,
            seed,
            output_image: "",
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: RenderResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;

        tracing::debug!(
            seed,
            code = parsed.code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fast render finished",
        );
        asset_from_response(parsed)
    }
}

fn asset_from_response(response: RenderResponse) -> Result<Asset, ProviderError> {
    if response.code != 0 {
        return Err(ProviderError::Api {
            status: 200,
            body: format!(
                "backend code {}: {}",
                response.code,
                response.msg.unwrap_or_default()
            ),
        });
    }

    let encoded = response
        .data
        .and_then(|d| d.image)
        .filter(|i| !i.is_empty())
        .ok_or(ProviderError::EmptyResponse { expected: "image" })?;

    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| ProviderError::Decode(format!("image base64: {e}")))?;
    Ok(Asset::new(bytes, "image/png"))
}
