use std::time::Duration;

use sparkit_core::request::MAX_VARIANTS;

/// Pipeline tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wall-clock budget for one request, excluding persistence.
    pub request_budget: Duration,
    /// Separate budget for uploads and ledger closes.
    pub persist_budget: Duration,
    /// Pause between variants on the serial (fast) backend.
    pub serial_delay: Duration,
    pub max_variants: usize,
    /// Resolution hint passed to the quality image backend.
    pub resolution: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_budget: Duration::from_secs(300),
            persist_budget: Duration::from_secs(60),
            serial_delay: Duration::from_millis(1000),
            max_variants: MAX_VARIANTS,
            resolution: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `PIPELINE_REQUEST_BUDGET_SECS` | `300`   |
    /// | `PIPELINE_PERSIST_BUDGET_SECS` | `60`    |
    /// | `PIPELINE_SERIAL_DELAY_MS`     | `1000`  |
    /// | `PIPELINE_MAX_VARIANTS`        | `10`    |
    /// | `PIPELINE_IMAGE_RESOLUTION`    | (none)  |
    pub fn from_env() -> Self {
        let request_budget_secs: u64 = std::env::var("PIPELINE_REQUEST_BUDGET_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("PIPELINE_REQUEST_BUDGET_SECS must be a valid u64");

        let persist_budget_secs: u64 = std::env::var("PIPELINE_PERSIST_BUDGET_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("PIPELINE_PERSIST_BUDGET_SECS must be a valid u64");

        let serial_delay_ms: u64 = std::env::var("PIPELINE_SERIAL_DELAY_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("PIPELINE_SERIAL_DELAY_MS must be a valid u64");

        let max_variants: usize = std::env::var("PIPELINE_MAX_VARIANTS")
            .unwrap_or_else(|_| MAX_VARIANTS.to_string())
            .parse()
            .expect("PIPELINE_MAX_VARIANTS must be a valid usize");

        Self {
            request_budget: Duration::from_secs(request_budget_secs),
            persist_budget: Duration::from_secs(persist_budget_secs),
            serial_delay: Duration::from_millis(serial_delay_ms),
            max_variants: max_variants.clamp(1, MAX_VARIANTS),
            resolution: std::env::var("PIPELINE_IMAGE_RESOLUTION")
                .ok()
                .filter(|r| !r.trim().is_empty()),
        }
    }
}
