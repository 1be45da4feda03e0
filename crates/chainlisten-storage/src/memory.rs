//! In-memory storage backend.
//!
//! Stores checkpoints and membership records in RAM.
//! Useful for tests and short-lived listeners that don't need persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chainlisten_core::{
    Checkpoint, CheckpointStore, ListenerError, MembershipRecord, MembershipRepository,
};

/// In-memory listener storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    memberships: Mutex<Vec<MembershipRecord>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, ListenerError> {
    m.lock().map_err(|e| ListenerError::Storage(e.to_string()))
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All membership records in insertion order.
    pub fn memberships(&self) -> Result<Vec<MembershipRecord>, ListenerError> {
        Ok(lock(&self.memberships)?.clone())
    }

    /// Total number of membership records.
    pub fn membership_count(&self) -> Result<usize, ListenerError> {
        Ok(lock(&self.memberships)?.len())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(&self, listener_id: &str) -> Result<Option<Checkpoint>, ListenerError> {
        Ok(lock(&self.checkpoints)?.get(listener_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ListenerError> {
        lock(&self.checkpoints)?.insert(checkpoint.listener_id.clone(), checkpoint);
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for InMemoryStorage {
    async fn create_membership_event(
        &self,
        mut record: MembershipRecord,
    ) -> Result<MembershipRecord, ListenerError> {
        let mut rows = lock(&self.memberships)?;
        record.id = rows.len() as i64 + 1;
        rows.push(record.clone());
        Ok(record)
    }

    async fn membership_by_order_id(
        &self,
        order_id: u64,
    ) -> Result<Option<MembershipRecord>, ListenerError> {
        Ok(lock(&self.memberships)?
            .iter()
            .rev()
            .find(|r| r.order_id == order_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order_id: u64, amount: &str) -> MembershipRecord {
        MembershipRecord {
            id: 0,
            user_address: "0x1111111111111111111111111111111111111111".into(),
            order_id,
            transaction_hash: format!("0x{order_id:064x}"),
            amount: amount.into(),
            status: 1,
            created_at: 1_700_000_000,
            end_duration: 1_700_000_000 + 365 * 86_400,
        }
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = InMemoryStorage::new();
        assert!(store.load("membership").await.unwrap().is_none());

        store
            .save(Checkpoint {
                listener_id: "membership".into(),
                block_number: 1_000,
                updated_at: 1,
            })
            .await
            .unwrap();
        store
            .save(Checkpoint {
                listener_id: "membership".into(),
                block_number: 1_200,
                updated_at: 2,
            })
            .await
            .unwrap();

        let cp = store.load("membership").await.unwrap().unwrap();
        assert_eq!(cp.block_number, 1_200);
        assert!(store.load("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn membership_ids_and_lookup() {
        let store = InMemoryStorage::new();
        let a = store.create_membership_event(record(7, "100")).await.unwrap();
        let b = store.create_membership_event(record(8, "200")).await.unwrap();
        let c = store.create_membership_event(record(7, "300")).await.unwrap();
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));

        let latest = store.membership_by_order_id(7).await.unwrap().unwrap();
        assert_eq!(latest.amount, "300");
        assert!(store.membership_by_order_id(9).await.unwrap().is_none());
        assert_eq!(store.membership_count().unwrap(), 3);
    }
}
