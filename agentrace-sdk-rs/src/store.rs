use crate::error::StoreError;
use crate::events::{ConversationState, Message};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

pub mod file;
pub mod memory;

pub use file::FileMessageStore;
pub use memory::InMemoryMessageStore;

#[async_trait]
/// Ordered, append-only message history per thread.
///
/// Writers for one thread are serialized through [`MessageStore::lease`]; the
/// store itself never reorders or drops entries. Backends that persist
/// elsewhere (disk, database) implement the same trait.
pub trait MessageStore: Send + Sync {
    /// Creates an empty thread. Registering an existing thread is a no-op.
    async fn register(&self, thread_id: &str) -> Result<(), StoreError>;

    /// Appends one message.
    ///
    /// # Errors
    /// * `UnknownThread` - the store requires registration and `thread_id` was never registered.
    async fn append(&self, thread_id: &str, message: Message) -> Result<(), StoreError>;

    /// Appends several messages in order.
    async fn append_all(&self, thread_id: &str, messages: Vec<Message>) -> Result<(), StoreError> {
        for message in messages {
            self.append(thread_id, message).await?;
        }
        Ok(())
    }

    /// Full ordered history, or `NotFound`.
    async fn load(&self, thread_id: &str) -> Result<ConversationState, StoreError>;

    async fn checkpoint(&self, thread_id: &str) -> Result<Checkpoint, StoreError> {
        let state = self.load(thread_id).await?;
        Ok(Checkpoint::capture(state))
    }

    /// Replaces the thread's history with the snapshot and returns the restored state.
    async fn restore(&self, checkpoint: &Checkpoint) -> Result<ConversationState, StoreError>;

    /// Waits until the caller is the only writer for `thread_id`.
    async fn lease(&self, thread_id: &str) -> ThreadLease;
}

/// Opaque snapshot of one thread: its id and message sequence, nothing more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    id: Uuid,
    thread_id: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn capture(state: ConversationState) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id: state.thread_id,
            messages: state.messages,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The state this checkpoint restores to.
    pub fn state(&self) -> ConversationState {
        ConversationState::new(self.thread_id.clone(), self.messages.clone())
    }

    pub fn encode(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(token: &str) -> Result<Self, StoreError> {
        serde_json::from_str(token).map_err(|e| StoreError::InvalidCheckpoint(e.to_string()))
    }
}

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Exclusive write access to one thread, released on drop.
///
/// The last lease out for a thread also drops that thread's lock entry.
#[derive(Debug)]
pub struct ThreadLease {
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl ThreadLease {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the entry under this lock, so a count of one means nobody else holds it.
        if locks
            .get(&self.thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.thread_id);
        }
    }
}

/// Per-thread async mutexes backing [`MessageStore::lease`].
#[derive(Default)]
pub struct ThreadLocks {
    locks: LockMap,
}

impl ThreadLocks {
    pub async fn acquire(&self, thread_id: &str) -> ThreadLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        ThreadLease {
            thread_id: thread_id.to_string(),
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
        }
    }

    /// Number of threads with a lease held or awaited.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_checkpoint_token_round_trip() {
        let state = ConversationState::new(
            "t1",
            vec![Message::user("hi"), Message::assistant("hello")],
        );
        let checkpoint = Checkpoint::capture(state.clone());

        let decoded = Checkpoint::decode(&checkpoint.encode().unwrap()).unwrap();
        assert_eq!(decoded, checkpoint);
        assert_eq!(decoded.state(), state);
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let err = Checkpoint::decode("not a checkpoint").unwrap_err();
        assert!(matches!(err, StoreError::InvalidCheckpoint(_)));
    }

    #[tokio::test]
    async fn test_lease_serializes_same_thread() {
        let locks = Arc::new(ThreadLocks::default());
        let first = locks.acquire("t1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("t1").await.thread_id().to_string() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // A different thread is never blocked.
        let other = locks.acquire("t2").await;
        assert_eq!(other.thread_id(), "t2");

        drop(first);
        assert_eq!(contender.await.unwrap(), "t1");
    }

    #[tokio::test]
    async fn test_released_leases_leave_no_entries() {
        let locks = ThreadLocks::default();
        for i in 0..1_000 {
            let lease = locks.acquire(&format!("thread-{}", i)).await;
            assert_eq!(locks.active(), 1);
            drop(lease);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(ThreadLocks::default());
        let first = locks.acquire("t1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let lease = locks.acquire("t1").await;
                tokio::time::sleep(Duration::from_millis(10)).await;
                drop(lease);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.active(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.active(), 0);
    }
}
