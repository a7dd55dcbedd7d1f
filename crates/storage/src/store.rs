use async_trait::async_trait;

use crate::error::{PrimaryUploadError, StorageError};

/// The primary asset store. Uploads carry an access credential that can
/// expire; [`refresh_credential`](Self::refresh_credential) obtains a new one.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Upload one file and return its public URL.
    async fn upload(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
        token: &str,
    ) -> Result<String, PrimaryUploadError>;

    /// Obtain a fresh access credential.
    async fn refresh_credential(&self) -> Result<String, StorageError>;
}

/// Secondary store used when the primary store fails.
#[async_trait]
pub trait FallbackStore: Send + Sync {
    /// Upload one file and return its public URL.
    async fn upload(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
    ) -> Result<String, StorageError>;
}
