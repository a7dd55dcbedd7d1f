use std::str::FromStr;
use std::time::Duration;

use sparkit_pipeline::PipelineConfig;

/// Default CORS origin: the local web client dev server.
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Time the HTTP timeout must leave on top of the pipeline budgets for
/// reading the multipart body and opening the batch.
pub const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed browser origins.
    pub cors_origins: Vec<String>,
    /// Upper bound for one HTTP request. See
    /// [`ServerConfig::check_pipeline_budgets`].
    pub request_timeout_secs: u64,
    /// How long in-flight requests may drain after a shutdown signal.
    pub shutdown_timeout_secs: u64,
    /// Largest accepted multipart body for `/generate`.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Read settings from the environment.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `420`                   |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `MAX_BODY_BYTES`        | `67108864` (64 MiB)     |
    ///
    /// `CORS_ORIGINS` is comma-separated. Panics on unparseable numbers.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("PORT", 3000),
            cors_origins: parse_origins(
                &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGIN.into()),
            ),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 420),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            max_body_bytes: env_or("MAX_BODY_BYTES", 64 * 1024 * 1024),
        }
    }

    /// The HTTP timeout must outlast a whole pipeline run: both budgets plus
    /// [`REQUEST_TIMEOUT_MARGIN`]. A shorter timeout cuts batches off while
    /// their results are still being stored.
    pub fn check_pipeline_budgets(&self, pipeline: &PipelineConfig) -> Result<(), String> {
        let required = pipeline.request_budget + pipeline.persist_budget + REQUEST_TIMEOUT_MARGIN;
        if Duration::from_secs(self.request_timeout_secs) < required {
            return Err(format!(
                "REQUEST_TIMEOUT_SECS is {}s but the pipeline needs at least {}s \
                 (request budget {}s + persist budget {}s + {}s margin)",
                self.request_timeout_secs,
                required.as_secs(),
                pipeline.request_budget.as_secs(),
                pipeline.persist_budget.as_secs(),
                REQUEST_TIMEOUT_MARGIN.as_secs(),
            ));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
