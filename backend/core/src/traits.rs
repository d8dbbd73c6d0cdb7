use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{PersistenceError, TransportError};
use crate::types::{ActivityRecord, ChatId, UserId};

/// Durable store operations consumed by the activity cache and the sync job.
///
/// Every operation returns an explicit `PersistenceError`; callers branch on
/// its kind instead of letting failures propagate.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Whether a durable row exists for the user.
    async fn exists(&self, user_id: UserId) -> Result<bool, PersistenceError>;

    /// Register a new user. Fails with `Duplicate` if the row already exists.
    async fn insert(&self, record: &ActivityRecord) -> Result<(), PersistenceError>;

    /// Last-write-wins overwrite of the cycle counters. Fails with
    /// `NotFound` if the user was never registered.
    async fn update_counts(
        &self,
        user_id: UserId,
        message_count: u64,
        last_message_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;

    async fn fetch_count(&self, user_id: UserId) -> Result<u64, PersistenceError>;

    async fn fetch_first_message(&self, user_id: UserId) -> Result<DateTime<Utc>, PersistenceError>;

    async fn fetch_last_message(&self, user_id: UserId) -> Result<DateTime<Utc>, PersistenceError>;

    /// All durable records, ordered by user id.
    async fn fetch_all(&self) -> Result<Vec<ActivityRecord>, PersistenceError>;

    /// Zero every row's counter at the cycle boundary. Returns the number of
    /// rows touched.
    async fn reset_counts(&self) -> Result<usize, PersistenceError>;
}

/// Outbound text delivery to a chat.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    async fn announce(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;
}
