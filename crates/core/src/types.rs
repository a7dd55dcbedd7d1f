//! Shared primitive aliases.

/// Ledger row id (`BIGSERIAL`).
pub type DbId = i64;

/// Ledger timestamps, stored as `TIMESTAMPTZ` and always handled in UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
