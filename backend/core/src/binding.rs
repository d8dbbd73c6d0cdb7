use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::types::ChatId;

/// The allow-listed chats plus the single chat that receives reports.
///
/// The report chat is either configured up front or captured from the first
/// accepted event; once set it never changes.
#[derive(Debug)]
pub struct ChatBinding {
    allowed: BTreeSet<ChatId>,
    target: OnceLock<ChatId>,
}

impl ChatBinding {
    pub fn new(allowed: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            target: OnceLock::new(),
        }
    }

    /// Bind the report chat eagerly. Chats outside the allow-list are ignored.
    pub fn with_target(self, chat_id: ChatId) -> Self {
        if self.admits(chat_id) {
            let _ = self.target.set(chat_id);
        }
        self
    }

    pub fn admits(&self, chat_id: ChatId) -> bool {
        self.allowed.contains(&chat_id)
    }

    /// Capture `chat_id` as the report chat if none is bound yet.
    /// Returns `true` only for the call that performed the binding.
    pub fn bind(&self, chat_id: ChatId) -> bool {
        self.admits(chat_id) && self.target.set(chat_id).is_ok()
    }

    pub fn target(&self) -> Option<ChatId> {
        self.target.get().copied()
    }

    pub fn allowed(&self) -> impl Iterator<Item = ChatId> + '_ {
        self.allowed.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_admitted_chat_wins() {
        let binding = ChatBinding::new([-100, -200]);
        assert_eq!(binding.target(), None);
        assert!(binding.bind(-200));
        assert!(!binding.bind(-100));
        assert_eq!(binding.target(), Some(-200));
    }

    #[test]
    fn foreign_chat_never_binds() {
        let binding = ChatBinding::new([-100]);
        assert!(!binding.admits(5));
        assert!(!binding.bind(5));
        assert_eq!(binding.target(), None);
    }

    #[test]
    fn configured_target_is_preferred() {
        let binding = ChatBinding::new([-100, -200]).with_target(-100);
        assert!(!binding.bind(-200));
        assert_eq!(binding.target(), Some(-100));
    }
}
