//! Transport-independent admission of inbound events.

use std::sync::Arc;

use tracing::{debug, info};

use corpsewatch_core::{ChatBinding, InboundEvent};
use corpsewatch_memory::ActivityCache;

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Counted in the cache. `newly_bound` is set for the event that
    /// captured the report chat.
    Counted { newly_bound: bool },
    /// From a chat outside the allow-list; the transport should reply with
    /// `notice`.
    Rejected { notice: String },
}

/// Gate between a transport and the activity cache.
pub struct Intake {
    binding: Arc<ChatBinding>,
    cache: Arc<ActivityCache>,
    restricted_notice: String,
}

impl Intake {
    pub fn new(binding: Arc<ChatBinding>, cache: Arc<ActivityCache>, restricted_notice: String) -> Self {
        Self {
            binding,
            cache,
            restricted_notice,
        }
    }

    pub async fn handle(&self, event: &InboundEvent) -> Admission {
        if !self.binding.admits(event.chat_id) {
            info!(
                chat_id = event.chat_id,
                user_id = %event.user_id,
                name = %event.display_name,
                "Rejected event from chat outside the allow-list"
            );
            return Admission::Rejected {
                notice: self.restricted_notice.clone(),
            };
        }

        let newly_bound = self.binding.bind(event.chat_id);
        if newly_bound {
            info!(chat_id = event.chat_id, "Report chat bound");
        }

        self.cache
            .observe(event.user_id, &event.display_name, event.timestamp)
            .await;
        debug!(chat_id = event.chat_id, user_id = %event.user_id, "Event counted");
        Admission::Counted { newly_bound }
    }

    pub fn binding(&self) -> &ChatBinding {
        &self.binding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use corpsewatch_core::{PersistenceGateway, UserId};
    use corpsewatch_memory::InMemoryGateway;

    fn event(user: i64, chat: i64) -> InboundEvent {
        InboundEvent {
            user_id: UserId(user),
            display_name: format!("user{user}"),
            chat_id: chat,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn intake(allowed: &[i64]) -> (Intake, Arc<ActivityCache>) {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(InMemoryGateway::new());
        let cache = Arc::new(ActivityCache::new(gateway));
        let intake = Intake::new(
            Arc::new(ChatBinding::new(allowed.iter().copied())),
            Arc::clone(&cache),
            "not here".to_string(),
        );
        (intake, cache)
    }

    #[tokio::test]
    async fn foreign_chat_is_rejected_and_not_counted() {
        let (intake, cache) = intake(&[-100]);
        let admission = intake.handle(&event(1, -999)).await;
        assert_eq!(
            admission,
            Admission::Rejected { notice: "not here".to_string() }
        );
        assert!(cache.is_empty());
        assert_eq!(intake.binding().target(), None);
    }

    #[tokio::test]
    async fn first_admitted_event_binds_the_report_chat() {
        let (intake, cache) = intake(&[-100, -200]);

        assert_eq!(
            intake.handle(&event(1, -200)).await,
            Admission::Counted { newly_bound: true }
        );
        assert_eq!(
            intake.handle(&event(2, -100)).await,
            Admission::Counted { newly_bound: false }
        );
        assert_eq!(intake.binding().target(), Some(-200));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn admitted_events_are_counted() {
        let (intake, cache) = intake(&[-100]);
        for _ in 0..3 {
            intake.handle(&event(7, -100)).await;
        }
        assert_eq!(cache.get(UserId(7)).unwrap().message_count, 3);
    }
}
