//! Route definitions for the `/tasks` resource.

use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /        -> list_active  (?kind=pose)
/// DELETE /{id}    -> delete_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_active))
        .route("/{id}", delete(tasks::delete_task))
}
