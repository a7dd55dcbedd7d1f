//! Domain errors shared by every crate.
//!
//! HTTP status mapping happens in the API crate; pipeline code converts
//! these into its own taxonomy at the boundary.

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// No ledger row with this id exists for the caller.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Rejected input: a malformed request, asset, option or URL.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing or malformed owner identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = CoreError::NotFound {
            entity: "GenerationTask",
            id: 7,
        };
        assert_eq!(err.to_string(), "Entity not found: GenerationTask with id 7");
        assert_eq!(
            CoreError::Validation("variant count must be between 1 and 10".into()).to_string(),
            "Validation failed: variant count must be between 1 and 10"
        );
    }
}
