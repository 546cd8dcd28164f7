//! Chat-to-conversation mapping that lets a chat resume its agent conversation.

use crate::model::{ChatId, ConversationId};
use dashmap::DashMap;
use tracing::debug;

/// Maps each chat to the most recent conversation handle the agent reported.
///
/// Entries live for the lifetime of the process and are never evicted.
/// Implementations must tolerate concurrent access from independent chats.
pub trait SessionStore: Send + Sync {
    fn get(&self, chat_id: &ChatId) -> Option<ConversationId>;

    /// Records a handle for the chat. The last write wins.
    fn put(&self, chat_id: &ChatId, conversation_id: ConversationId);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store sharded by chat id, so writers for different chats rarely contend.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<ChatId, ConversationId>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, chat_id: &ChatId) -> Option<ConversationId> {
        self.sessions.get(chat_id).map(|entry| entry.value().clone())
    }

    fn put(&self, chat_id: &ChatId, conversation_id: ConversationId) {
        let previous = self.sessions.insert(chat_id.clone(), conversation_id.clone());
        if previous.as_ref() != Some(&conversation_id) {
            debug!(%chat_id, %conversation_id, ?previous, "Conversation handle recorded");
        }
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn conv(id: &str) -> ConversationId {
        ConversationId::parse(id).unwrap()
    }

    #[test]
    fn test_get_missing_chat_returns_none() {
        let store = MemorySessionStore::new();
        assert!(store.get(&ChatId::from("42")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_overwrites_with_last_write() {
        let store = MemorySessionStore::new();
        let chat = ChatId::from("42");

        store.put(&chat, conv("first"));
        store.put(&chat, conv("second"));

        assert_eq!(store.get(&chat), Some(conv("second")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_chats_are_independent() {
        let store = MemorySessionStore::new();
        store.put(&ChatId::from("1"), conv("a"));
        store.put(&ChatId::from("2"), conv("b"));

        assert_eq!(store.get(&ChatId::from("1")), Some(conv("a")));
        assert_eq!(store.get(&ChatId::from("2")), Some(conv("b")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_for_distinct_chats() {
        let store = Arc::new(MemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let chat = ChatId::from(i as i64);
                store.put(&chat, conv(&format!("conv-{i}")));
                store.get(&chat)
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Some(conv(&format!("conv-{i}"))));
        }
        assert_eq!(store.len(), 32);
    }
}
