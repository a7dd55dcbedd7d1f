use std::sync::Arc;

use sparkit_pipeline::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: sparkit_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Generation pipeline, including the task ledger.
    pub orchestrator: Arc<Orchestrator>,
}
