//! Listener configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ListenerError;

/// Where a run starts when a checkpoint exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Rescan the checkpoint block itself. Events sharing a block with the
    /// checkpointed one are seen again rather than lost.
    #[default]
    Inclusive,
    /// Start at `checkpoint + 1`.
    Next,
}

/// Tunables for a listener instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Unique name for this listener (the checkpoint key).
    pub id: String,
    /// How far behind the head to start when no checkpoint exists.
    pub default_block_offset: u64,
    /// Maximum number of blocks per `eth_getLogs` call.
    pub max_block_range: u64,
    /// Capacity of the dispatch queue between scanner and sink.
    pub queue_capacity: usize,
    /// Fetch attempts per range (first try included).
    pub max_retries: u32,
    /// Fixed sleep between fetch attempts, in milliseconds.
    pub retry_delay_ms: u64,
    pub resume: ResumeMode,
    /// Start a fresh run this often; `None` = a single run.
    pub poll_interval_ms: Option<u64>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            default_block_offset: 10,
            max_block_range: 2048,
            queue_capacity: 100,
            max_retries: 3,
            retry_delay_ms: 2000,
            resume: ResumeMode::Inclusive,
            poll_interval_ms: None,
        }
    }
}

impl ListenerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    /// Reject values the scan loop cannot work with.
    pub fn validate(&self) -> Result<(), ListenerError> {
        if self.id.trim().is_empty() {
            return Err(ListenerError::Config("id must not be empty".into()));
        }
        if self.max_block_range == 0 {
            return Err(ListenerError::Config("max_block_range must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ListenerError::Config("queue_capacity must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(ListenerError::Config("max_retries must be at least 1".into()));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(ListenerError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
