//! Handlers for the `/tasks` resource: progress polling over the task ledger.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use sparkit_core::error::CoreError;
use sparkit_core::types::DbId;
use sparkit_db::models::generation_task::{GenerationTask, TaskListQuery};

use crate::error::{AppError, AppResult};
use crate::middleware::owner::OwnerKey;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/tasks
///
/// Pending, processing and failed entries for the caller, newest first.
pub async fn list_active(
    State(state): State<AppState>,
    OwnerKey(owner): OwnerKey,
    Query(params): Query<TaskListQuery>,
) -> AppResult<Json<DataResponse<Vec<GenerationTask>>>> {
    let kind = params.kind.as_deref().map(str::trim).filter(|k| !k.is_empty());
    let tasks = state.orchestrator.ledger().list_active(&owner, kind).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// DELETE /api/v1/tasks/{id}
///
/// Remove one of the caller's entries. Entries of other owners are reported
/// as not found.
pub async fn delete_task(
    State(state): State<AppState>,
    OwnerKey(owner): OwnerKey,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if state.orchestrator.ledger().remove(id, &owner).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "GenerationTask",
            id,
        }))
    }
}
