use super::{HistoryError, HistoryRecord, NewHistoryRecord, UserContext};
use async_trait::async_trait;
use uuid::Uuid;

/// Upper bound on records returned by a single listing.
pub const MAX_HISTORY_LIMIT: usize = 50;

/// Persistence boundary for scan history. Every call is scoped to one user.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    async fn insert(
        &self,
        user: &UserContext,
        record: NewHistoryRecord,
    ) -> Result<HistoryRecord, HistoryError>;

    /// Newest first, at most `limit.min(MAX_HISTORY_LIMIT)` records.
    async fn list(
        &self,
        user: &UserContext,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// `Ok(false)` when no record with `id` exists for the user.
    async fn delete(&self, user: &UserContext, id: Uuid) -> Result<bool, HistoryError>;
}
