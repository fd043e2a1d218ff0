use super::{Checkpoint, MessageStore, ThreadLease, ThreadLocks};
use crate::error::StoreError;
use crate::events::{ConversationState, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store. Threads live as long as the store.
#[derive(Default)]
pub struct InMemoryMessageStore {
    threads: RwLock<HashMap<String, Vec<Message>>>,
    require_registration: bool,
    locks: ThreadLocks,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `append` fails with `UnknownThread` for unregistered threads.
    pub fn with_required_registration() -> Self {
        Self {
            require_registration: true,
            ..Self::default()
        }
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn register(&self, thread_id: &str) -> Result<(), StoreError> {
        self.threads
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default();
        Ok(())
    }

    async fn append(&self, thread_id: &str, message: Message) -> Result<(), StoreError> {
        self.append_all(thread_id, vec![message]).await
    }

    async fn append_all(&self, thread_id: &str, messages: Vec<Message>) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        if self.require_registration && !threads.contains_key(thread_id) {
            return Err(StoreError::UnknownThread(thread_id.to_string()));
        }
        threads
            .entry(thread_id.to_string())
            .or_default()
            .extend(messages);
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<ConversationState, StoreError> {
        let threads = self.threads.read().await;
        let messages = threads
            .get(thread_id)
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
        Ok(ConversationState::new(thread_id, messages.clone()))
    }

    async fn restore(&self, checkpoint: &Checkpoint) -> Result<ConversationState, StoreError> {
        let state = checkpoint.state();
        self.threads
            .write()
            .await
            .insert(state.thread_id.clone(), state.messages.clone());
        Ok(state)
    }

    async fn lease(&self, thread_id: &str) -> ThreadLease {
        self.locks.acquire(thread_id).await
    }
}
