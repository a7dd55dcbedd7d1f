//! Repository for the `generation_tasks` ledger table.
//!
//! Every status literal comes from `TaskStatus`. Close operations only touch
//! rows that are still pending or processing, so a row is closed at most once.

use sparkit_core::types::DbId;
use sqlx::PgPool;

use crate::models::generation_task::GenerationTask;
use crate::models::status::{TaskStatus, ACTIVE_TASK_STATUSES, OPEN_TASK_STATUSES};

/// Column list for `generation_tasks` queries.
const COLUMNS: &str = "\
    id, owner_key, task_kind, description, status_id, \
    output_url, error_message, created_at, updated_at";

/// Maximum rows returned by a polling query.
const MAX_ACTIVE_ROWS: i64 = 100;

/// Provides ledger operations for generation tasks.
pub struct GenerationTaskRepo;

impl GenerationTaskRepo {
    /// Insert one pending row per description in a single transaction.
    ///
    /// Rows come back in input order.
    pub async fn create_batch(
        pool: &PgPool,
        owner_key: &str,
        task_kind: &str,
        descriptions: &[Option<String>],
    ) -> Result<Vec<GenerationTask>, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_tasks (owner_key, task_kind, description, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let mut rows = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            let row = sqlx::query_as::<_, GenerationTask>(&query)
                .bind(owner_key)
                .bind(task_kind)
                .bind(description.as_deref())
                .bind(TaskStatus::Pending.id())
                .fetch_one(&mut *tx)
                .await?;
            rows.push(row);
        }
        tx.commit().await?;

        Ok(rows)
    }

    /// Move pending rows to processing. Returns the number of rows changed.
    pub async fn mark_processing(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_tasks SET status_id = $2 \
             WHERE id = ANY($1) AND status_id = $3",
        )
        .bind(ids)
        .bind(TaskStatus::Processing.id())
        .bind(TaskStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Close an open row as completed with its output URL.
    ///
    /// A `None` description keeps the one written at batch start. Returns
    /// `false` when the row is missing or already closed.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        output_url: &str,
        description: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_tasks \
             SET status_id = $2, output_url = $3, \
                 description = COALESCE($4, description), error_message = NULL \
             WHERE id = $1 AND status_id = ANY($5)",
        )
        .bind(id)
        .bind(TaskStatus::Completed.id())
        .bind(output_url)
        .bind(description)
        .bind(&OPEN_TASK_STATUSES[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close an open row as failed. Returns `false` when missing or already closed.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_tasks \
             SET status_id = $2, error_message = $3 \
             WHERE id = $1 AND status_id = ANY($4)",
        )
        .bind(id)
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .bind(&OPEN_TASK_STATUSES[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail every row in `ids` that is still open. Returns the number closed.
    pub async fn fail_open(pool: &PgPool, ids: &[DbId], error: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_tasks \
             SET status_id = $2, error_message = $3 \
             WHERE id = ANY($1) AND status_id = ANY($4)",
        )
        .bind(ids)
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .bind(&OPEN_TASK_STATUSES[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete rows left behind by an earlier batch for the same owner and kind.
    ///
    /// Removes pending, processing and failed rows, plus completed rows that
    /// never received an output URL (written before completion required one).
    pub async fn delete_stale(
        pool: &PgPool,
        owner_key: &str,
        task_kind: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM generation_tasks \
             WHERE owner_key = $1 AND task_kind = $2 \
               AND (status_id = ANY($3) OR (status_id = $4 AND output_url IS NULL))",
        )
        .bind(owner_key)
        .bind(task_kind)
        .bind(&ACTIVE_TASK_STATUSES[..])
        .bind(TaskStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Pending, processing and failed rows for an owner, newest first.
    pub async fn list_active(
        pool: &PgPool,
        owner_key: &str,
        task_kind: Option<&str>,
    ) -> Result<Vec<GenerationTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_tasks \
             WHERE owner_key = $1 AND status_id = ANY($2) \
               AND ($3::TEXT IS NULL OR task_kind = $3) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4"
        );
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(owner_key)
            .bind(&ACTIVE_TASK_STATUSES[..])
            .bind(task_kind)
            .bind(MAX_ACTIVE_ROWS)
            .fetch_all(pool)
            .await
    }

    /// Rows for the given ids, ordered by id.
    pub async fn list_by_ids(
        pool: &PgPool,
        ids: &[DbId],
    ) -> Result<Vec<GenerationTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_tasks WHERE id = ANY($1) ORDER BY id"
        );
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GenerationTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_tasks WHERE id = $1");
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete one row owned by `owner_key`. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId, owner_key: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM generation_tasks WHERE id = $1 AND owner_key = $2")
                .bind(id)
                .bind(owner_key)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
