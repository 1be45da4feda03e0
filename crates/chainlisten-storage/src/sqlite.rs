//! SQLite storage backend for ChainListen.
//!
//! Persists listener checkpoints (`block_state`) and membership purchases
//! (`membership_events`) to a single SQLite file.
//!
//! # Usage
//! ```rust,no_run
//! use chainlisten_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./listener.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use chainlisten_core::{
    Checkpoint, CheckpointStore, ListenerError, MembershipRecord, MembershipRepository,
};

fn storage_err(e: sqlx::Error) -> ListenerError {
    ListenerError::Storage(e.to_string())
}

/// SQLite-backed storage for checkpoints and membership records.
///
/// Unsigned 64-bit values (block numbers, order ids) are stored bit-for-bit
/// in `INTEGER` columns and read back unchanged.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./listener.db"`) or a full
    /// SQLite URL (`"sqlite:./listener.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ListenerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. A single connection keeps
    /// every query on the same database.
    pub async fn in_memory() -> Result<Self, ListenerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), ListenerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block_state (
                listener_id TEXT    PRIMARY KEY,
                last_block  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS membership_events (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                user_address     TEXT    NOT NULL,
                order_id         INTEGER NOT NULL,
                transaction_hash TEXT    NOT NULL,
                amount           TEXT    NOT NULL,
                status           INTEGER NOT NULL,
                created_at       INTEGER NOT NULL,
                end_duration     INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_membership_order ON membership_events (order_id);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Number of stored membership records.
    pub async fn membership_count(&self) -> Result<u64, ListenerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM membership_events")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

fn membership_from_row(r: &SqliteRow) -> MembershipRecord {
    MembershipRecord {
        id: r.get("id"),
        user_address: r.get("user_address"),
        order_id: r.get::<i64, _>("order_id") as u64,
        transaction_hash: r.get("transaction_hash"),
        amount: r.get("amount"),
        status: r.get("status"),
        created_at: r.get("created_at"),
        end_duration: r.get("end_duration"),
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(&self, listener_id: &str) -> Result<Option<Checkpoint>, ListenerError> {
        let row = sqlx::query(
            "SELECT listener_id, last_block, updated_at FROM block_state WHERE listener_id = ?",
        )
        .bind(listener_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Checkpoint {
            listener_id: r.get("listener_id"),
            block_number: r.get::<i64, _>("last_block") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ListenerError> {
        sqlx::query(
            "INSERT INTO block_state (listener_id, last_block, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(listener_id) DO UPDATE SET
                last_block = excluded.last_block,
                updated_at = excluded.updated_at",
        )
        .bind(&checkpoint.listener_id)
        .bind(checkpoint.block_number as i64)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            listener_id = %checkpoint.listener_id,
            block = checkpoint.block_number,
            "checkpoint saved"
        );
        Ok(())
    }
}

// ─── MembershipRepository impl ───────────────────────────────────────────────

#[async_trait]
impl MembershipRepository for SqliteStorage {
    async fn create_membership_event(
        &self,
        mut record: MembershipRecord,
    ) -> Result<MembershipRecord, ListenerError> {
        let result = sqlx::query(
            "INSERT INTO membership_events
             (user_address, order_id, transaction_hash, amount, status, created_at, end_duration)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.user_address)
        .bind(record.order_id as i64)
        .bind(&record.transaction_hash)
        .bind(&record.amount)
        .bind(record.status)
        .bind(record.created_at)
        .bind(record.end_duration)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        record.id = result.last_insert_rowid();
        debug!(id = record.id, order_id = record.order_id, "membership stored");
        Ok(record)
    }

    async fn membership_by_order_id(
        &self,
        order_id: u64,
    ) -> Result<Option<MembershipRecord>, ListenerError> {
        let row = sqlx::query(
            "SELECT id, user_address, order_id, transaction_hash, amount, status,
                    created_at, end_duration
             FROM membership_events WHERE order_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(order_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(membership_from_row))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order_id: u64) -> MembershipRecord {
        MembershipRecord {
            id: 0,
            user_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
            order_id,
            transaction_hash: format!("0x{order_id:064x}"),
            amount: "1000000000000000000".into(),
            status: 1,
            created_at: 1_700_000_000,
            end_duration: 1_700_000_000 + 1095 * 86_400,
        }
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.load("membership").await.unwrap().is_none());

        store
            .save(Checkpoint {
                listener_id: "membership".into(),
                block_number: 1_000,
                updated_at: 1_700_000_000,
            })
            .await
            .unwrap();

        let loaded = store.load("membership").await.unwrap().unwrap();
        assert_eq!(loaded.block_number, 1_000);
        assert_eq!(loaded.updated_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn checkpoint_upsert() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for (block, at) in [(100, 0), (200, 1)] {
            store
                .save(Checkpoint {
                    listener_id: "membership".into(),
                    block_number: block,
                    updated_at: at,
                })
                .await
                .unwrap();
        }

        let loaded = store.load("membership").await.unwrap().unwrap();
        assert_eq!(loaded.block_number, 200);
        assert_eq!(loaded.updated_at, 1);
    }

    #[tokio::test]
    async fn membership_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let saved = store.create_membership_event(record(42)).await.unwrap();
        assert!(saved.id > 0);

        let loaded = store.membership_by_order_id(42).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(store.membership_by_order_id(43).await.unwrap().is_none());
        assert_eq!(store.membership_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn large_order_id_survives() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.create_membership_event(record(u64::MAX)).await.unwrap();
        let loaded = store.membership_by_order_id(u64::MAX).await.unwrap().unwrap();
        assert_eq!(loaded.order_id, u64::MAX);
    }
}
