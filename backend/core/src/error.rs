use std::fmt;

use thiserror::Error;

use crate::types::{ChatId, UserId};

/// What went wrong inside the durable store, so callers can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceErrorKind {
    /// The row addressed by the operation does not exist.
    NotFound,
    /// A registration collided with an existing row.
    Duplicate,
    /// The store itself failed (I/O, lock, corrupt value).
    Backend,
}

impl fmt::Display for PersistenceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Duplicate => "duplicate",
            Self::Backend => "backend failure",
        };
        f.write_str(s)
    }
}

/// A failed durable-store operation.
///
/// Recoverable: the in-memory cache stays authoritative and the next
/// scheduled sync retries the write.
#[derive(Debug, Clone, Error)]
#[error("{op} failed ({kind}) for user {user}: {message}", user = DisplayUser(.user_id))]
pub struct PersistenceError {
    pub kind: PersistenceErrorKind,
    pub op: &'static str,
    pub user_id: Option<UserId>,
    pub message: String,
}

impl PersistenceError {
    pub fn new(
        kind: PersistenceErrorKind,
        op: &'static str,
        user_id: Option<UserId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            op,
            user_id,
            message: message.into(),
        }
    }

    pub fn not_found(op: &'static str, user_id: UserId) -> Self {
        Self::new(PersistenceErrorKind::NotFound, op, Some(user_id), "no such user")
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == PersistenceErrorKind::NotFound
    }
}

struct DisplayUser<'a>(&'a Option<UserId>);

impl fmt::Display for DisplayUser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("*"),
        }
    }
}

/// Outbound delivery failures. Never affect cache state.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("send to chat {chat_id} failed: {message}")]
    Send { chat_id: ChatId, message: String },
}

/// Failures of the weekly report computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// No participants were recorded this cycle.
    #[error("snapshot contains no activity records")]
    EmptySnapshot,

    /// Broken cache invariant; should be unreachable.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),
}
