use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sparkit_core::sanitize::OutputSanitizer;
use sparkit_pipeline::{Collaborators, Orchestrator, PgTaskLedger, PipelineConfig, Workflow};
use sparkit_providers::fast::{FastRenderClient, FastRenderConfig};
use sparkit_providers::gemini::{GeminiClient, GeminiConfig};
use sparkit_providers::FastImageGenerator;
use sparkit_storage::config::{ResourceStoreConfig, S3FallbackConfig};
use sparkit_storage::resource_api::ResourceApiStore;
use sparkit_storage::s3::S3FallbackStore;
use sparkit_storage::{CredentialCache, FallbackStore, PrimaryStore, UploadPipeline};
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sparkit_api::config::ServerConfig;
use sparkit_api::router::build_app_router;
use sparkit_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sparkit_api=debug,sparkit_pipeline=debug,sparkit_storage=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = sparkit_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    sparkit_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    sparkit_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Generation collaborators ---
    let gemini_config = GeminiConfig::from_env().expect("GEMINI_API_KEY must be set");
    let gemini = Arc::new(GeminiClient::new(gemini_config).expect("Failed to build Gemini client"));

    let fast = FastRenderConfig::from_env().map(|c| {
        let client = FastRenderClient::new(c).expect("Failed to build fast render client");
        Arc::new(client) as Arc<dyn FastImageGenerator>
    });
    tracing::info!(enabled = fast.is_some(), "Fast render backend");

    // --- Asset stores ---
    let primary = ResourceStoreConfig::from_env().map(|c| {
        let store = ResourceApiStore::new(c).expect("Failed to build resource API client");
        Arc::new(store) as Arc<dyn PrimaryStore>
    });
    let fallback = match S3FallbackConfig::from_env() {
        Some(c) => Some(Arc::new(S3FallbackStore::from_config(c).await) as Arc<dyn FallbackStore>),
        None => None,
    };
    tracing::info!(
        primary = primary.is_some(),
        fallback = fallback.is_some(),
        "Asset stores configured",
    );

    let uploads = UploadPipeline::new(primary, fallback, Arc::new(CredentialCache::new()));
    if !uploads.is_configured() {
        tracing::warn!("No asset store configured; generation requests will be rejected");
    }

    // --- Pipeline ---
    let pipeline_config = PipelineConfig::from_env();
    if let Err(e) = config.check_pipeline_budgets(&pipeline_config) {
        panic!("Invalid timeout configuration: {e}");
    }
    tracing::info!(
        request_budget_secs = pipeline_config.request_budget.as_secs(),
        persist_budget_secs = pipeline_config.persist_budget.as_secs(),
        "Loaded pipeline configuration",
    );

    let collaborators = Collaborators {
        text: gemini.clone(),
        image: gemini,
        fast,
        uploads,
        ledger: Arc::new(PgTaskLedger::new(pool.clone())),
    };
    let orchestrator = Orchestrator::new(
        collaborators,
        Workflow::builtin().expect("Built-in workflows must compile"),
        pipeline_config,
        OutputSanitizer::default(),
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator: Arc::new(orchestrator),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // In-flight generation requests get `shutdown_timeout_secs` to drain.
    let shutdown_started = Arc::new(Notify::new());
    let signal = {
        let shutdown_started = Arc::clone(&shutdown_started);
        async move {
            shutdown_signal().await;
            shutdown_started.notify_one();
        }
    };
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
    });

    let drain_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    tokio::select! {
        result = &mut server => {
            result.expect("Server task panicked").expect("Server error");
            tracing::info!("Graceful shutdown complete");
        }
        () = async {
            shutdown_started.notified().await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "Shutdown drain timed out, dropping in-flight requests",
            );
            server.abort();
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly under a process manager as well as interactively.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
