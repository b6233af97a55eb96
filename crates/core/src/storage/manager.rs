use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::portfolio::PortfolioState;

use super::backend::StorageBackend;

/// Storage key of the persisted portfolio record.
pub const PORTFOLIO_KEY: &str = "crypto-portfolio";

/// Saves and restores the single portfolio record.
///
/// Flow: PortfolioState → JSON → backend[`PORTFOLIO_KEY`]. No merging:
/// every save overwrites the record and the last write wins.
#[derive(Clone)]
pub struct StorageManager {
    backend: Arc<dyn StorageBackend>,
    key: String,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager").field("key", &self.key).finish()
    }
}

impl StorageManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_key(backend, PORTFOLIO_KEY)
    }

    /// Store the record under a different key (e.g. one file per profile).
    pub fn with_key(backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize `state` and overwrite the stored record.
    pub fn save(&self, state: &PortfolioState) -> Result<(), CoreError> {
        let json = serde_json::to_string(state)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize portfolio: {e}")))?;
        self.backend.write(&self.key, &json)
    }

    /// Restore the stored record.
    ///
    /// Never fails: a missing, unreadable or corrupt record yields the empty
    /// portfolio. Failures are logged and otherwise swallowed.
    pub fn load(&self) -> PortfolioState {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => PortfolioState::new(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "discarding unreadable portfolio record");
                PortfolioState::new()
            }
        }
    }

    /// Like [`load`](Self::load) but reports why a record couldn't be used.
    pub fn try_load(&self) -> Result<Option<PortfolioState>, CoreError> {
        let Some(raw) = self.backend.read(&self.key)? else {
            return Ok(None);
        };
        let state: PortfolioState = serde_json::from_str(&raw).map_err(|e| {
            CoreError::Deserialization(format!("Failed to deserialize portfolio: {e}"))
        })?;
        Ok(Some(state))
    }

    /// Delete the stored record.
    pub fn remove(&self) -> Result<(), CoreError> {
        self.backend.remove(&self.key)
    }
}
