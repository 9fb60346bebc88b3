mod memory;
mod record;
mod rest;
mod store;

pub use memory::MemoryHistoryStore;
pub use record::{HistoryRecord, NewHistoryRecord, ScanType, UserContext};
pub use rest::RestHistoryStore;
pub use store::{HistoryStore, MAX_HISTORY_LIMIT};

use crate::ranking::Prediction;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("No predictions to save")]
    NoPredictions,
    #[error("No signed-in user")]
    NotAuthenticated,
    #[error("Failed to save scan: {0}")]
    Write(String),
    #[error("Failed to delete scan: {0}")]
    Delete(String),
    #[error("Failed to fetch scan history: {0}")]
    Fetch(String),
}

/// Appends classification outcomes to the user's scan history and keeps a
/// newest-first copy of what it has seen, so its own writes show up without a
/// refetch.
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    user: RwLock<Option<UserContext>>,
    cache: RwLock<Vec<HistoryRecord>>,
    default_limit: usize,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, default_limit: usize) -> Self {
        Self {
            store,
            user: RwLock::new(None),
            cache: RwLock::new(Vec::new()),
            default_limit: default_limit.clamp(1, MAX_HISTORY_LIMIT),
        }
    }

    /// Switches identity. The cached history belongs to the previous user and
    /// is dropped. Nothing is fetched here; the cache fills again on the next
    /// `list` or `save`.
    pub fn set_user(&self, user: Option<UserContext>) {
        let mut current = self.user.write();
        let changed = current.as_ref().map(|u| &u.user_id) != user.as_ref().map(|u| &u.user_id);
        *current = user;
        if changed {
            self.cache.write().clear();
        }
    }

    pub fn user(&self) -> Option<UserContext> {
        self.user.read().clone()
    }

    pub fn cached(&self) -> Vec<HistoryRecord> {
        self.cache.read().clone()
    }

    fn is_current_user(&self, user_id: &str) -> bool {
        self.user
            .read()
            .as_ref()
            .is_some_and(|user| user.user_id == user_id)
    }

    #[instrument(skip(self, predictions))]
    pub async fn save(
        &self,
        predictions: &[Prediction],
        scan_type: ScanType,
        image_ref: Option<String>,
    ) -> Result<HistoryRecord, HistoryError> {
        if predictions.is_empty() {
            return Err(HistoryError::NoPredictions);
        }
        let user = self.user().ok_or(HistoryError::NotAuthenticated)?;
        let new = NewHistoryRecord::from_predictions(&user.user_id, predictions, scan_type, image_ref)
            .ok_or(HistoryError::NoPredictions)?;

        let record = self.store.insert(&user, new).await.map_err(|err| {
            tracing::error!("Error saving scan: {}", err);
            match err {
                HistoryError::Write(_) => err,
                other => HistoryError::Write(other.to_string()),
            }
        })?;

        if self.is_current_user(&user.user_id) {
            self.cache.write().insert(0, record.clone());
        }
        tracing::info!("Saved scan {}", record.id);

        Ok(record)
    }

    /// Lists the newest records (the configured default when `limit` is
    /// `None`) and refreshes the cache with them.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<HistoryRecord>, HistoryError> {
        let user = self.user().ok_or(HistoryError::NotAuthenticated)?;
        let limit = limit.unwrap_or(self.default_limit).min(MAX_HISTORY_LIMIT);

        let records = self.store.list(&user, limit).await.map_err(|err| {
            tracing::error!("Error fetching scan history: {}", err);
            err
        })?;

        if self.is_current_user(&user.user_id) {
            *self.cache.write() = records.clone();
        }

        Ok(records)
    }

    /// Returns false when the record could not be deleted, including when it
    /// does not exist. Storage errors are logged, not returned.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> bool {
        let Some(user) = self.user() else {
            return false;
        };

        match self.store.delete(&user, id).await {
            Ok(true) => {
                self.cache.write().retain(|record| record.id != id);
                true
            }
            Ok(false) => {
                tracing::debug!("Scan {} not found", id);
                false
            }
            Err(err) => {
                tracing::error!("Error deleting scan: {}", err);
                false
            }
        }
    }
}
