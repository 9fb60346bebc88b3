use super::store::{HistoryStore, MAX_HISTORY_LIMIT};
use super::{HistoryError, HistoryRecord, NewHistoryRecord, UserContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Process-local history store. Records are kept in insertion order.
pub struct MemoryHistoryStore {
    records: RwLock<Vec<HistoryRecord>>,
    clock: Clock,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            clock: Box::new(clock),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(
        &self,
        user: &UserContext,
        record: NewHistoryRecord,
    ) -> Result<HistoryRecord, HistoryError> {
        if record.user_id != user.user_id {
            return Err(HistoryError::Write(
                "record belongs to another user".to_string(),
            ));
        }

        let record = record.into_record(Uuid::new_v4(), (self.clock)());
        self.records.write().push(record.clone());
        Ok(record)
    }

    async fn list(
        &self,
        user: &UserContext,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = self.records.read();
        let mut listed: Vec<(usize, &HistoryRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.user_id == user.user_id)
            .collect();

        // newest first; equal timestamps fall back to insertion order
        listed.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b_seq.cmp(a_seq))
        });

        Ok(listed
            .into_iter()
            .take(limit.min(MAX_HISTORY_LIMIT))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn delete(&self, user: &UserContext, id: Uuid) -> Result<bool, HistoryError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| !(record.id == id && record.user_id == user.user_id));
        Ok(records.len() != before)
    }
}
