pub mod generate;
pub mod health;
pub mod tasks;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /generate/{workflow}      run a generation batch (POST, multipart)
///
/// /tasks                    active ledger entries for the owner (?kind=)
/// /tasks/{id}               delete one entry (DELETE)
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        .nest("/generate", generate::router(config.max_body_bytes))
        .nest("/tasks", tasks::router())
}
