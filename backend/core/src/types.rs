use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat identifier as issued by the transport.
pub type ChatId = i64;

/// Stable user identifier as issued by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Per-user activity counters for the current cycle.
///
/// Invariants: `first_message_at <= last_message_at`; `message_count` only
/// grows between resets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub user_id: UserId,
    /// Latest observed name for the user.
    pub display_name: String,
    pub message_count: u64,
    pub first_message_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// A freshly registered user whose first message arrived at `now`.
    pub fn registered(user_id: UserId, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            message_count: 1,
            first_message_at: now,
            last_message_at: now,
        }
    }

    /// A record with no messages yet this cycle. `observe` turns it into a
    /// registered one.
    pub fn empty(user_id: UserId, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            message_count: 0,
            ..Self::registered(user_id, display_name, now)
        }
    }

    /// Count one message. The first message after a reset re-stamps
    /// `first_message_at`.
    pub fn observe(&mut self, display_name: &str, now: DateTime<Utc>) {
        if self.display_name != display_name {
            self.display_name = display_name.to_string();
        }
        if self.message_count == 0 {
            self.first_message_at = now;
            self.last_message_at = now;
        } else {
            self.last_message_at = self.last_message_at.max(now);
        }
        self.message_count += 1;
    }

    /// Zero the counter at the cycle boundary. Identity and timestamps stay.
    pub fn reset(&mut self) {
        self.message_count = 0;
    }
}

/// A message event as delivered by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub display_name: String,
    pub chat_id: ChatId,
    pub timestamp: DateTime<Utc>,
}
