//! Route definitions for the `/generate` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::generate;
use crate::state::AppState;

/// Routes mounted at `/generate`.
///
/// ```text
/// POST /{workflow}    -> generate_batch  (pose | snapshot | mimic)
/// ```
pub fn router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/{workflow}", post(generate::generate_batch))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}
