//! Shared access credential for the primary store.
//!
//! Concurrent uploaders read the cached token without coordination. A
//! refresh holds the refresh gate, so at most one uploader talks to the
//! credential endpoint at a time. Refreshes after a rejection are not
//! deduplicated: each rejected uploader performs its own.

use tokio::sync::{Mutex, RwLock};

use crate::error::StorageError;
use crate::store::PrimaryStore;

#[derive(Debug, Default)]
pub struct CredentialCache {
    token: RwLock<Option<String>>,
    refresh_gate: Mutex<()>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache already holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            refresh_gate: Mutex::new(()),
        }
    }

    pub async fn current(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// The cached token, fetching one if the cache is empty.
    ///
    /// The first fetch is shared: uploaders that queue behind it reuse its token.
    pub async fn get_or_fetch(&self, store: &dyn PrimaryStore) -> Result<String, StorageError> {
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        if let Some(token) = self.current().await {
            return Ok(token);
        }
        self.store_fresh(store).await
    }

    /// Replace the cached token with a fresh one.
    pub async fn refresh(&self, store: &dyn PrimaryStore) -> Result<String, StorageError> {
        let _gate = self.refresh_gate.lock().await;
        self.store_fresh(store).await
    }

    async fn store_fresh(&self, store: &dyn PrimaryStore) -> Result<String, StorageError> {
        let token = store.refresh_credential().await?;
        *self.token.write().await = Some(token.clone());
        tracing::debug!("Primary store credential refreshed");
        Ok(token)
    }
}
