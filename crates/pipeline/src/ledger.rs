//! Task ledger: persisted per-variant progress for polling clients.

use async_trait::async_trait;
use sparkit_core::types::DbId;
use sparkit_db::models::generation_task::GenerationTask;
use sparkit_db::repositories::GenerationTaskRepo;
use sparkit_db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Task ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task ledger error: {0}")]
    Other(String),
}

/// How a ledger entry is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    Completed {
        output_url: String,
        /// Replaces the description written at batch start when set.
        description: Option<String>,
    },
    Failed {
        error: String,
    },
}

/// Persisted lifecycle of every sub-task in a batch.
///
/// Entries are created pending by `open_batch` and closed at most once;
/// closing an entry that is already terminal is a no-op returning `false`.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Clean up stale entries for `owner`/`kind`, then insert one pending
    /// entry per description. Ids come back in input order.
    async fn open_batch(
        &self,
        owner: &str,
        kind: &str,
        descriptions: &[Option<String>],
    ) -> Result<Vec<DbId>, LedgerError>;

    /// Move pending entries to processing.
    async fn mark_processing(&self, ids: &[DbId]) -> Result<u64, LedgerError>;

    async fn close_entry(&self, id: DbId, outcome: &LedgerOutcome) -> Result<bool, LedgerError>;

    /// Delete entries of an abandoned batch. Returns the number deleted.
    async fn cleanup_stale(&self, owner: &str, kind: &str) -> Result<u64, LedgerError>;

    /// Fail every entry in `ids` that is still open.
    async fn fail_open(&self, ids: &[DbId], reason: &str) -> Result<u64, LedgerError>;

    async fn list_active(
        &self,
        owner: &str,
        kind: Option<&str>,
    ) -> Result<Vec<GenerationTask>, LedgerError>;

    async fn list_by_ids(&self, ids: &[DbId]) -> Result<Vec<GenerationTask>, LedgerError>;

    /// Delete one entry owned by `owner`.
    async fn remove(&self, id: DbId, owner: &str) -> Result<bool, LedgerError>;
}

/// PostgreSQL ledger over the `generation_tasks` table.
#[derive(Clone)]
pub struct PgTaskLedger {
    pool: DbPool,
}

impl PgTaskLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskLedger for PgTaskLedger {
    async fn open_batch(
        &self,
        owner: &str,
        kind: &str,
        descriptions: &[Option<String>],
    ) -> Result<Vec<DbId>, LedgerError> {
        let deleted = self.cleanup_stale(owner, kind).await?;
        if deleted > 0 {
            tracing::debug!(owner, kind, deleted, "Removed stale ledger entries");
        }

        let rows = GenerationTaskRepo::create_batch(&self.pool, owner, kind, descriptions).await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn mark_processing(&self, ids: &[DbId]) -> Result<u64, LedgerError> {
        Ok(GenerationTaskRepo::mark_processing(&self.pool, ids).await?)
    }

    async fn close_entry(&self, id: DbId, outcome: &LedgerOutcome) -> Result<bool, LedgerError> {
        let closed = match outcome {
            LedgerOutcome::Completed {
                output_url,
                description,
            } => {
                GenerationTaskRepo::complete(&self.pool, id, output_url, description.as_deref())
                    .await?
            }
            LedgerOutcome::Failed { error } => {
                GenerationTaskRepo::fail(&self.pool, id, error).await?
            }
        };
        Ok(closed)
    }

    async fn cleanup_stale(&self, owner: &str, kind: &str) -> Result<u64, LedgerError> {
        Ok(GenerationTaskRepo::delete_stale(&self.pool, owner, kind).await?)
    }

    async fn fail_open(&self, ids: &[DbId], reason: &str) -> Result<u64, LedgerError> {
        Ok(GenerationTaskRepo::fail_open(&self.pool, ids, reason).await?)
    }

    async fn list_active(
        &self,
        owner: &str,
        kind: Option<&str>,
    ) -> Result<Vec<GenerationTask>, LedgerError> {
        Ok(GenerationTaskRepo::list_active(&self.pool, owner, kind).await?)
    }

    async fn list_by_ids(&self, ids: &[DbId]) -> Result<Vec<GenerationTask>, LedgerError> {
        Ok(GenerationTaskRepo::list_by_ids(&self.pool, ids).await?)
    }

    async fn remove(&self, id: DbId, owner: &str) -> Result<bool, LedgerError> {
        Ok(GenerationTaskRepo::delete(&self.pool, id, owner).await?)
    }
}
