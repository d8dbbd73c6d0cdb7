use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use corpsewatch_core::{
    ActivityRecord, PersistenceError, PersistenceErrorKind, PersistenceGateway, UserId,
};

/// In-process durable store stand-in for tests and dry runs.
///
/// Counts inserts, can inject failures, and can add per-call latency to
/// widen race windows.
#[derive(Default)]
pub struct InMemoryGateway {
    rows: RwLock<BTreeMap<UserId, ActivityRecord>>,
    inserts: AtomicUsize,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Pre-populate a durable row, bypassing the insert counter.
    pub fn seed(&self, record: ActivityRecord) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.user_id, record);
    }

    /// Make every subsequent call fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful inserts.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn row(&self, user_id: UserId) -> Option<ActivityRecord> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
    }

    async fn enter(&self, op: &'static str, user_id: Option<UserId>) -> Result<(), PersistenceError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::new(
                PersistenceErrorKind::Backend,
                op,
                user_id,
                "injected failure",
            ));
        }
        Ok(())
    }

    fn read_row<T>(
        &self,
        op: &'static str,
        user_id: UserId,
        f: impl FnOnce(&ActivityRecord) -> T,
    ) -> Result<T, PersistenceError> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .map(f)
            .ok_or_else(|| PersistenceError::not_found(op, user_id))
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn exists(&self, user_id: UserId) -> Result<bool, PersistenceError> {
        self.enter("exists", Some(user_id)).await?;
        Ok(self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&user_id))
    }

    async fn insert(&self, record: &ActivityRecord) -> Result<(), PersistenceError> {
        self.enter("insert", Some(record.user_id)).await?;
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if rows.contains_key(&record.user_id) {
            return Err(PersistenceError::new(
                PersistenceErrorKind::Duplicate,
                "insert",
                Some(record.user_id),
                "user already registered",
            ));
        }
        rows.insert(record.user_id, record.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_counts(
        &self,
        user_id: UserId,
        message_count: u64,
        last_message_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.enter("update_counts", Some(user_id)).await?;
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let row = rows
            .get_mut(&user_id)
            .ok_or_else(|| PersistenceError::not_found("update_counts", user_id))?;
        row.message_count = message_count;
        row.last_message_at = last_message_at;
        Ok(())
    }

    async fn fetch_count(&self, user_id: UserId) -> Result<u64, PersistenceError> {
        self.enter("fetch_count", Some(user_id)).await?;
        self.read_row("fetch_count", user_id, |row| row.message_count)
    }

    async fn fetch_first_message(&self, user_id: UserId) -> Result<DateTime<Utc>, PersistenceError> {
        self.enter("fetch_first_message", Some(user_id)).await?;
        self.read_row("fetch_first_message", user_id, |row| row.first_message_at)
    }

    async fn fetch_last_message(&self, user_id: UserId) -> Result<DateTime<Utc>, PersistenceError> {
        self.enter("fetch_last_message", Some(user_id)).await?;
        self.read_row("fetch_last_message", user_id, |row| row.last_message_at)
    }

    async fn fetch_all(&self) -> Result<Vec<ActivityRecord>, PersistenceError> {
        self.enter("fetch_all", None).await?;
        Ok(self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    async fn reset_counts(&self) -> Result<usize, PersistenceError> {
        self.enter("reset_counts", None).await?;
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        for row in rows.values_mut() {
            row.message_count = 0;
        }
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let gateway = InMemoryGateway::new();
        let record = ActivityRecord::registered(UserId(1), "alice", now());
        gateway.insert(&record).await.unwrap();
        let err = gateway.insert(&record).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::Duplicate);
        assert_eq!(gateway.insert_count(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_user_is_not_found() {
        let gateway = InMemoryGateway::new();
        let err = gateway.update_counts(UserId(9), 3, now()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn reset_counts_zeroes_every_row() {
        let gateway = InMemoryGateway::new();
        gateway.seed(ActivityRecord { message_count: 7, ..ActivityRecord::registered(UserId(1), "a", now()) });
        gateway.seed(ActivityRecord::registered(UserId(2), "b", now()));

        assert_eq!(gateway.reset_counts().await.unwrap(), 2);
        assert_eq!(gateway.row(UserId(1)).unwrap().message_count, 0);
        assert_eq!(gateway.row(UserId(2)).unwrap().message_count, 0);
        assert_eq!(gateway.row(UserId(1)).unwrap().first_message_at, now());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_backend_errors() {
        let gateway = InMemoryGateway::new();
        gateway.set_failing(true);
        let err = gateway.exists(UserId(1)).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::Backend);
        gateway.set_failing(false);
        assert!(!gateway.exists(UserId(1)).await.unwrap());
    }
}
