//! Checkpoint manager: persists how far a listener has handed events off.
//!
//! A checkpoint stores the block number of the last event accepted by the
//! dispatch queue. On restart the listener resumes from it rather than
//! rescanning the contract's whole history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ListenerError;

/// A persisted checkpoint for one listener identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique listener identifier (one row per identity).
    pub listener_id: String,
    /// Block number of the last event handed off.
    pub block_number: u64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
///
/// Implementations include `InMemoryStorage` and `SqliteStorage` in
/// `chainlisten-storage`. `save` overwrites unconditionally; ordering is the
/// caller's job.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a listener, if one was ever written.
    async fn load(&self, listener_id: &str) -> Result<Option<Checkpoint>, ListenerError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ListenerError>;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<T> {
    async fn load(&self, listener_id: &str) -> Result<Option<Checkpoint>, ListenerError> {
        (**self).load(listener_id).await
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ListenerError> {
        (**self).save(checkpoint).await
    }
}

/// Manages checkpoint reads/writes for one listener.
///
/// Writes are monotonic: a block lower than or equal to the last value this
/// manager persisted (or loaded) is skipped. The remembered value only moves
/// after a successful save, so a failed write is retried by the next event.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    listener_id: String,
    persisted: Option<u64>,
}

impl CheckpointManager {
    pub fn new(store: Box<dyn CheckpointStore>, listener_id: impl Into<String>) -> Self {
        Self {
            store,
            listener_id: listener_id.into(),
            persisted: None,
        }
    }

    pub fn listener_id(&self) -> &str {
        &self.listener_id
    }

    /// Last value known to be persisted by this manager.
    pub fn persisted(&self) -> Option<u64> {
        self.persisted
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<Checkpoint>, ListenerError> {
        self.store.load(&self.listener_id).await
    }

    /// Block of the last handed-off event.
    ///
    /// A missing row and a stored `0` both mean "no prior progress" and
    /// yield `None`.
    pub async fn last_processed_block(&mut self) -> Result<Option<u64>, ListenerError> {
        let block = self
            .load()
            .await?
            .map(|cp| cp.block_number)
            .filter(|&b| b > 0);
        if let Some(b) = block {
            self.persisted = Some(self.persisted.map_or(b, |p| p.max(b)));
        }
        Ok(block)
    }

    /// Persist `block_number` unless it would not move the checkpoint forward.
    ///
    /// Returns `Ok(true)` if a write happened.
    pub async fn update_last_processed_block(
        &mut self,
        block_number: u64,
    ) -> Result<bool, ListenerError> {
        if self.persisted.is_some_and(|p| block_number <= p) {
            return Ok(false);
        }
        let cp = Checkpoint {
            listener_id: self.listener_id.clone(),
            block_number,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await?;
        self.persisted = Some(block_number);
        Ok(true)
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory checkpoint store for tests and ephemeral listeners.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, listener_id: &str) -> Result<Option<Checkpoint>, ListenerError> {
        let data = self
            .data
            .lock()
            .map_err(|e| ListenerError::Storage(e.to_string()))?;
        Ok(data.get(listener_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ListenerError> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| ListenerError::Storage(e.to_string()))?;
        data.insert(checkpoint.listener_id.clone(), checkpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = Box::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store, "membership");

        assert!(mgr.last_processed_block().await.unwrap().is_none());

        assert!(mgr.update_last_processed_block(1000).await.unwrap());

        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 1000);
        assert_eq!(cp.listener_id, "membership");
        assert_eq!(mgr.last_processed_block().await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn zero_checkpoint_means_no_progress() {
        let store = MemoryCheckpointStore::new();
        store
            .save(Checkpoint {
                listener_id: "idx".into(),
                block_number: 0,
                updated_at: 0,
            })
            .await
            .unwrap();
        let mut mgr = CheckpointManager::new(Box::new(store), "idx");
        assert_eq!(mgr.last_processed_block().await.unwrap(), None);
    }

    #[tokio::test]
    async fn never_writes_backward() {
        let mut mgr = CheckpointManager::new(Box::new(MemoryCheckpointStore::new()), "idx");

        assert!(mgr.update_last_processed_block(50).await.unwrap());
        assert!(!mgr.update_last_processed_block(40).await.unwrap());
        assert!(!mgr.update_last_processed_block(50).await.unwrap());
        assert!(mgr.update_last_processed_block(51).await.unwrap());

        assert_eq!(mgr.load().await.unwrap().unwrap().block_number, 51);
    }

    #[tokio::test]
    async fn loaded_value_guards_later_writes() {
        let store = MemoryCheckpointStore::new();
        store
            .save(Checkpoint {
                listener_id: "idx".into(),
                block_number: 900,
                updated_at: 0,
            })
            .await
            .unwrap();
        let mut mgr = CheckpointManager::new(Box::new(store), "idx");
        assert_eq!(mgr.last_processed_block().await.unwrap(), Some(900));

        assert!(!mgr.update_last_processed_block(899).await.unwrap());
        assert_eq!(mgr.persisted(), Some(900));
    }

    struct FlakyStore {
        fail: Arc<AtomicBool>,
        inner: MemoryCheckpointStore,
    }

    #[async_trait]
    impl CheckpointStore for FlakyStore {
        async fn load(&self, id: &str) -> Result<Option<Checkpoint>, ListenerError> {
            self.inner.load(id).await
        }

        async fn save(&self, cp: Checkpoint) -> Result<(), ListenerError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ListenerError::Storage("disk full".into()));
            }
            self.inner.save(cp).await
        }
    }

    #[tokio::test]
    async fn failed_write_is_retried_by_next_update() {
        let fail = Arc::new(AtomicBool::new(true));
        let store = FlakyStore {
            fail: fail.clone(),
            inner: MemoryCheckpointStore::new(),
        };
        let mut mgr = CheckpointManager::new(Box::new(store), "idx");

        assert!(mgr.update_last_processed_block(10).await.is_err());
        assert_eq!(mgr.persisted(), None);

        fail.store(false, Ordering::SeqCst);
        assert!(mgr.update_last_processed_block(10).await.unwrap());
        assert_eq!(mgr.persisted(), Some(10));
    }
}
