/// Errors from storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The store returned a non-2xx status code.
    #[error("Storage API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The store answered but refused the upload or returned no URL.
    #[error("Storage rejected upload: {0}")]
    Rejected(String),

    /// An S3 operation failed.
    #[error("S3 error: {0}")]
    S3(String),

    /// No usable access credential could be obtained.
    #[error("Credential unavailable: {0}")]
    Credential(String),
}

/// Outcome of a single primary-store upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum PrimaryUploadError {
    /// The access credential was rejected; refreshing it may help.
    #[error("Primary store rejected the access credential")]
    Unauthorized,

    #[error(transparent)]
    Failed(#[from] StorageError),
}
