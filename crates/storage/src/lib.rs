//! Asset storage: primary resource API with credential refresh, S3-compatible
//! fallback bucket, and the upload pipeline that chains them.

pub mod config;
pub mod credential;
pub mod error;
pub mod resource_api;
pub mod s3;
pub mod store;
pub mod upload;

pub use credential::CredentialCache;
pub use error::{PrimaryUploadError, StorageError};
pub use store::{FallbackStore, PrimaryStore};
pub use upload::{StoreKind, UploadOutcome, UploadPipeline};
