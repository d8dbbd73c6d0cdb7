/// SQLite-backed durable user-activity store.
///
/// One `users` row per participant keyed by user id. Timestamps are stored
/// as epoch milliseconds. The connection is guarded by an async mutex so the
/// gateway can be shared across the hot path and both scheduled jobs.
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, info};

use corpsewatch_core::{
    ActivityRecord, PersistenceError, PersistenceErrorKind, PersistenceGateway, UserId,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
         user_id       INTEGER PRIMARY KEY,
         username      TEXT NOT NULL,
         message_count INTEGER NOT NULL DEFAULT 0,
         first_message INTEGER,
         last_message  INTEGER
     );";

pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .context("Failed to open SQLite activity database")?;

        conn.execute_batch(&format!("PRAGMA journal_mode=WAL;\n{SCHEMA}"))
            .context("Failed to initialize users schema")?;

        info!("SqliteGateway opened at {:?}", path.as_ref());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    async fn fetch_timestamp(
        &self,
        op: &'static str,
        sql: &str,
        user_id: UserId,
    ) -> Result<DateTime<Utc>, PersistenceError> {
        let conn = self.conn.lock().await;
        let millis: Option<Option<i64>> = conn
            .query_row(sql, params![user_id.0], |row| row.get(0))
            .optional()
            .map_err(|e| backend(op, Some(user_id), e))?;
        match millis {
            Some(Some(ms)) => from_millis(op, user_id, ms),
            _ => Err(PersistenceError::not_found(op, user_id)),
        }
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn exists(&self, user_id: UserId) -> Result<bool, PersistenceError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT 1 FROM users WHERE user_id = ?1",
            params![user_id.0],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .map_err(|e| backend("exists", Some(user_id), e))
    }

    async fn insert(&self, record: &ActivityRecord) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (user_id, username, message_count, first_message, last_message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.user_id.0,
                record.display_name,
                to_count(record.message_count),
                record.first_message_at.timestamp_millis(),
                record.last_message_at.timestamp_millis(),
            ],
        )
        .map_err(|e| backend("insert", Some(record.user_id), e))?;
        debug!(user_id = %record.user_id, "Inserted user");
        Ok(())
    }

    async fn update_counts(
        &self,
        user_id: UserId,
        message_count: u64,
        last_message_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE users SET message_count = ?1, last_message = ?2 WHERE user_id = ?3",
                params![to_count(message_count), last_message_at.timestamp_millis(), user_id.0],
            )
            .map_err(|e| backend("update_counts", Some(user_id), e))?;
        if changed == 0 {
            return Err(PersistenceError::not_found("update_counts", user_id));
        }
        Ok(())
    }

    async fn fetch_count(&self, user_id: UserId) -> Result<u64, PersistenceError> {
        let conn = self.conn.lock().await;
        let count: Option<i64> = conn
            .query_row(
                "SELECT message_count FROM users WHERE user_id = ?1",
                params![user_id.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| backend("fetch_count", Some(user_id), e))?;
        count
            .map(|c| c.max(0) as u64)
            .ok_or_else(|| PersistenceError::not_found("fetch_count", user_id))
    }

    async fn fetch_first_message(&self, user_id: UserId) -> Result<DateTime<Utc>, PersistenceError> {
        self.fetch_timestamp(
            "fetch_first_message",
            "SELECT first_message FROM users WHERE user_id = ?1",
            user_id,
        )
        .await
    }

    async fn fetch_last_message(&self, user_id: UserId) -> Result<DateTime<Utc>, PersistenceError> {
        // Rows registered before last_message was tracked fall back to first_message.
        self.fetch_timestamp(
            "fetch_last_message",
            "SELECT COALESCE(last_message, first_message) FROM users WHERE user_id = ?1",
            user_id,
        )
        .await
    }

    async fn fetch_all(&self) -> Result<Vec<ActivityRecord>, PersistenceError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, username, message_count, first_message,
                        COALESCE(last_message, first_message)
                 FROM users ORDER BY user_id ASC",
            )
            .map_err(|e| backend("fetch_all", None, e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            })
            .map_err(|e| backend("fetch_all", None, e))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, username, count, first, last) = row.map_err(|e| backend("fetch_all", None, e))?;
            let user_id = UserId(id);
            let first = from_millis("fetch_all", user_id, first.unwrap_or(0))?;
            let last = last.map_or(Ok(first), |ms| from_millis("fetch_all", user_id, ms))?;
            records.push(ActivityRecord {
                user_id,
                display_name: username,
                message_count: count.max(0) as u64,
                first_message_at: first,
                last_message_at: last.max(first),
            });
        }
        Ok(records)
    }

    async fn reset_counts(&self) -> Result<usize, PersistenceError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute("UPDATE users SET message_count = 0", [])
            .map_err(|e| backend("reset_counts", None, e))?;
        info!(rows = changed, "Durable activity counters reset");
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn backend(op: &'static str, user_id: Option<UserId>, e: rusqlite::Error) -> PersistenceError {
    let kind = match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            PersistenceErrorKind::Duplicate
        }
        _ => PersistenceErrorKind::Backend,
    };
    PersistenceError::new(kind, op, user_id, e.to_string())
}

fn to_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn from_millis(op: &'static str, user_id: UserId, ms: i64) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        PersistenceError::new(
            PersistenceErrorKind::Backend,
            op,
            Some(user_id),
            format!("timestamp {ms} out of range"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn insert_then_fetch() {
        let store = SqliteGateway::in_memory().expect("in-memory db");
        let record = ActivityRecord::registered(UserId(10), "alice", at(0));
        store.insert(&record).await.unwrap();

        assert!(store.exists(UserId(10)).await.unwrap());
        assert!(!store.exists(UserId(11)).await.unwrap());
        assert_eq!(store.fetch_count(UserId(10)).await.unwrap(), 1);
        assert_eq!(store.fetch_first_message(UserId(10)).await.unwrap(), at(0));
        assert_eq!(store.fetch_last_message(UserId(10)).await.unwrap(), at(0));
    }

    #[tokio::test]
    async fn duplicate_insert_is_classified() {
        let store = SqliteGateway::in_memory().unwrap();
        let record = ActivityRecord::registered(UserId(10), "alice", at(0));
        store.insert(&record).await.unwrap();
        let err = store.insert(&record).await.unwrap_err();
        assert_eq!(err.kind, PersistenceErrorKind::Duplicate);
    }

    #[tokio::test]
    async fn update_counts_overwrites() {
        let store = SqliteGateway::in_memory().unwrap();
        store
            .insert(&ActivityRecord::registered(UserId(3), "bob", at(0)))
            .await
            .unwrap();
        store.update_counts(UserId(3), 42, at(60)).await.unwrap();
        store.update_counts(UserId(3), 40, at(90)).await.unwrap();

        assert_eq!(store.fetch_count(UserId(3)).await.unwrap(), 40);
        assert_eq!(store.fetch_last_message(UserId(3)).await.unwrap(), at(90));
        assert_eq!(store.fetch_first_message(UserId(3)).await.unwrap(), at(0));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let store = SqliteGateway::in_memory().unwrap();
        assert!(store.update_counts(UserId(1), 1, at(0)).await.unwrap_err().is_not_found());
        assert!(store.fetch_count(UserId(1)).await.unwrap_err().is_not_found());
        assert!(store.fetch_first_message(UserId(1)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn fetch_all_is_ordered_by_user_id() {
        let store = SqliteGateway::in_memory().unwrap();
        for (id, name) in [(30, "c"), (10, "a"), (20, "b")] {
            store
                .insert(&ActivityRecord::registered(UserId(id), name, at(id)))
                .await
                .unwrap();
        }
        let ids: Vec<i64> = store
            .fetch_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.user_id.0)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn reset_counts_keeps_rows_and_timestamps() {
        let store = SqliteGateway::in_memory().unwrap();
        for id in [1, 2] {
            store
                .insert(&ActivityRecord::registered(UserId(id), "x", at(0)))
                .await
                .unwrap();
        }
        store.update_counts(UserId(1), 9, at(30)).await.unwrap();

        assert_eq!(store.reset_counts().await.unwrap(), 2);
        assert_eq!(store.fetch_count(UserId(1)).await.unwrap(), 0);
        assert_eq!(store.fetch_count(UserId(2)).await.unwrap(), 0);
        assert_eq!(store.fetch_last_message(UserId(1)).await.unwrap(), at(30));
    }

    #[tokio::test]
    async fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");
        {
            let store = SqliteGateway::open(&path).unwrap();
            store
                .insert(&ActivityRecord::registered(UserId(5), "eve", at(0)))
                .await
                .unwrap();
            store.update_counts(UserId(5), 17, at(5)).await.unwrap();
        }
        let reopened = SqliteGateway::open(&path).unwrap();
        assert_eq!(reopened.fetch_count(UserId(5)).await.unwrap(), 17);
    }
}
