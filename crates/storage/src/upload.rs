//! Upload one generated asset: primary store first, fallback second.
//!
//! Retry budget per asset: on an unauthorized primary response the
//! credential is refreshed once and the upload retried once; any remaining
//! primary failure goes to the fallback store exactly once. Nothing else is
//! retried.

use std::sync::Arc;

use serde::Serialize;
use sparkit_core::request::extension_for;

use crate::credential::CredentialCache;
use crate::error::{PrimaryUploadError, StorageError};
use crate::store::{FallbackStore, PrimaryStore};

/// Which store served an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Primary,
    Fallback,
}

/// Result of uploading one asset: a URL or a reason, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored { url: String, store: StoreKind },
    Failed { reason: String },
}

impl UploadOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Stored { url, .. } => Some(url),
            Self::Failed { .. } => None,
        }
    }
}

/// Primary/fallback upload chain sharing one credential cache.
#[derive(Clone)]
pub struct UploadPipeline {
    primary: Option<Arc<dyn PrimaryStore>>,
    fallback: Option<Arc<dyn FallbackStore>>,
    credentials: Arc<CredentialCache>,
}

impl UploadPipeline {
    pub fn new(
        primary: Option<Arc<dyn PrimaryStore>>,
        fallback: Option<Arc<dyn FallbackStore>>,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            primary,
            fallback,
            credentials,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    /// Upload `bytes` as `{label}-{unix_millis}.{ext}`.
    pub async fn upload(&self, bytes: &[u8], media_type: &str, label: &str) -> UploadOutcome {
        let filename = format!(
            "{label}-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            extension_for(media_type)
        );

        let primary_error = match &self.primary {
            Some(primary) => {
                match self
                    .upload_primary(primary.as_ref(), bytes, media_type, &filename)
                    .await
                {
                    Ok(url) => {
                        tracing::debug!(%filename, store = "primary", "Asset uploaded");
                        return UploadOutcome::Stored {
                            url,
                            store: StoreKind::Primary,
                        };
                    }
                    Err(e) => {
                        tracing::warn!(%filename, error = %e, "Primary upload failed");
                        Some(e.to_string())
                    }
                }
            }
            None => None,
        };

        let Some(fallback) = &self.fallback else {
            return UploadOutcome::Failed {
                reason: primary_error.unwrap_or_else(|| "no asset store configured".into()),
            };
        };

        match fallback.upload(bytes, media_type, &filename).await {
            Ok(url) => {
                tracing::info!(%filename, store = "fallback", "Asset uploaded to fallback store");
                UploadOutcome::Stored {
                    url,
                    store: StoreKind::Fallback,
                }
            }
            Err(e) => {
                tracing::error!(%filename, error = %e, "Fallback upload failed");
                let reason = match primary_error {
                    Some(primary) => format!("primary: {primary}; fallback: {e}"),
                    None => e.to_string(),
                };
                UploadOutcome::Failed { reason }
            }
        }
    }

    async fn upload_primary(
        &self,
        primary: &dyn PrimaryStore,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
    ) -> Result<String, StorageError> {
        let token = self.credentials.get_or_fetch(primary).await?;

        match primary.upload(bytes, media_type, filename, &token).await {
            Ok(url) => Ok(url),
            Err(PrimaryUploadError::Failed(e)) => Err(e),
            Err(PrimaryUploadError::Unauthorized) => {
                tracing::info!(%filename, "Primary store credential rejected, refreshing");
                let token = self.credentials.refresh(primary).await?;
                match primary.upload(bytes, media_type, filename, &token).await {
                    Ok(url) => Ok(url),
                    Err(PrimaryUploadError::Failed(e)) => Err(e),
                    Err(PrimaryUploadError::Unauthorized) => Err(StorageError::Credential(
                        "credential rejected after refresh".into(),
                    )),
                }
            }
        }
    }
}
