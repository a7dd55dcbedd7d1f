//! Owner identity extractor.
//!
//! Identity is established upstream; the gateway forwards an opaque owner key
//! in the `x-owner-key` header and every ledger entry is scoped to it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sparkit_core::error::CoreError;
use sparkit_core::sanitize::is_unsafe_char;

use crate::error::AppError;

/// Header carrying the caller's owner key.
pub const OWNER_KEY_HEADER: &str = "x-owner-key";

/// Longest accepted owner key.
const MAX_OWNER_KEY_LEN: usize = 128;

/// The calling owner, taken from the `x-owner-key` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerKey(pub String);

impl<S: Send + Sync> FromRequestParts<S> for OwnerKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(format!(
                    "Missing {OWNER_KEY_HEADER} header"
                )))
            })?;

        if raw.len() > MAX_OWNER_KEY_LEN || raw.chars().any(is_unsafe_char) {
            return Err(AppError::Core(CoreError::Unauthorized(format!(
                "Invalid {OWNER_KEY_HEADER} header"
            ))));
        }

        Ok(OwnerKey(raw.to_string()))
    }
}
