use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::StoreError;
use crate::models::message::{ChatMessage, ChatTarget};

/// A page request over one audience's history.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub target: ChatTarget,
    pub limit: usize,
    /// Only messages with an ID strictly below this one.
    pub before: Option<i64>,
}

/// Persistent chat history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, message: ChatMessage) -> Result<ChatMessage, StoreError>;
    async fn find(&self, id: i64) -> Result<Option<ChatMessage>, StoreError>;
    /// Newest first, soft-deleted messages excluded.
    async fn history(&self, query: &HistoryQuery) -> Result<Vec<ChatMessage>, StoreError>;
    async fn update(&self, message: ChatMessage) -> Result<(), StoreError>;
    /// Drop messages older than `cutoff`. Returns how many were removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Keyed by snowflake ID, so iteration order is creation order.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<BTreeMap<i64, ChatMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create_message(&self, message: ChatMessage) -> Result<ChatMessage, StoreError> {
        self.messages.write().insert(message.id, message.clone());
        Ok(message)
    }

    async fn find(&self, id: i64) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self.messages.read().get(&id).cloned())
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<ChatMessage>, StoreError> {
        let upper = query.before.unwrap_or(i64::MAX);
        let messages = self.messages.read();
        Ok(messages
            .range(..upper)
            .rev()
            .map(|(_, m)| m)
            .filter(|m| !m.is_deleted && m.target.matches(&query.target))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn update(&self, message: ChatMessage) -> Result<(), StoreError> {
        let mut messages = self.messages.write();
        let slot = messages.get_mut(&message.id).ok_or(StoreError::NotFound)?;
        *slot = message;
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut messages = self.messages.write();
        let before = messages.len();
        messages.retain(|_, m| m.timestamp >= cutoff);
        Ok(before - messages.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::message::Author;

    fn msg(id: i64, target: ChatTarget, text: &str) -> ChatMessage {
        let author = Author {
            username: "river".into(),
            avatar: "🌸".into(),
        };
        ChatMessage::trusted(id, &author, target, text, Utc::now())
    }

    #[tokio::test]
    async fn history_is_newest_first_and_scoped() {
        let store = MemoryMessageStore::new();
        store.create_message(msg(1, ChatTarget::World, "a")).await.unwrap();
        store
            .create_message(msg(2, ChatTarget::Stream("peace".into()), "b"))
            .await
            .unwrap();
        store.create_message(msg(3, ChatTarget::World, "c")).await.unwrap();

        let page = store
            .history(&HistoryQuery {
                target: ChatTarget::World,
                limit: 10,
                before: None,
            })
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 1]);

        let older = store
            .history(&HistoryQuery {
                target: ChatTarget::World,
                limit: 10,
                before: Some(3),
            })
            .await
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].id, 1);
    }

    #[tokio::test]
    async fn history_skips_deleted() {
        let store = MemoryMessageStore::new();
        let mut gone = msg(1, ChatTarget::World, "bye");
        gone.soft_delete("river", Utc::now());
        store.create_message(gone).await.unwrap();
        store.create_message(msg(2, ChatTarget::World, "hi")).await.unwrap();

        let page = store
            .history(&HistoryQuery {
                target: ChatTarget::World,
                limit: 10,
                before: None,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 2);
    }

    #[tokio::test]
    async fn update_requires_existing_message() {
        let store = MemoryMessageStore::new();
        assert!(matches!(
            store.update(msg(9, ChatTarget::World, "x")).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn purge_removes_expired_messages() {
        let store = MemoryMessageStore::new();
        let mut old = msg(1, ChatTarget::World, "old");
        old.timestamp = Utc::now() - Duration::days(31);
        store.create_message(old).await.unwrap();
        store.create_message(msg(2, ChatTarget::World, "new")).await.unwrap();

        let removed = store
            .purge_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.find(1).await.unwrap().is_none());
    }
}
