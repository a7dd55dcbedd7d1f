//! Shared response envelope types for API handlers.
//!
//! List and lookup endpoints use a `{ "data": ... }` envelope. The generate
//! endpoint returns the batch response unwrapped.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
