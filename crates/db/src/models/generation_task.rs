//! Generation task ledger rows.
//!
//! One row per requested variant. Rows are created pending when a batch
//! starts and closed exactly once, as completed or failed, when it ends.

use serde::{Deserialize, Serialize};
use sparkit_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `generation_tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationTask {
    pub id: DbId,
    pub owner_key: String,
    pub task_kind: String,
    pub description: Option<String>,
    pub status_id: StatusId,
    pub output_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GenerationTask {
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }

    pub fn is_open(&self) -> bool {
        self.status().is_some_and(|s| !s.is_terminal())
    }
}

/// Query parameters for `GET /api/v1/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Restrict to one task kind (e.g. `pose`).
    pub kind: Option<String>,
}
