//! Shared types for the listener pipeline.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive range of blocks scanned by one `eth_getLogs` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    /// First block (inclusive).
    pub from: u64,
    /// Last block (inclusive).
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Range starting at `from`, ending at `to` but never wider than
    /// `max_width` blocks.
    ///
    /// `max_width` of zero is treated as one.
    pub fn capped(from: u64, to: u64, max_width: u64) -> Self {
        let widest_end = from.saturating_add(max_width.max(1) - 1);
        Self {
            from,
            to: widest_end.min(to),
        }
    }

    /// Number of blocks covered.
    pub fn width(&self) -> u64 {
        self.to.saturating_sub(self.from) + 1
    }

    /// Returns `true` if `block` falls inside the range.
    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

// ─── RawLog ───────────────────────────────────────────────────────────────────

/// An undecoded contract log as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Contract that emitted the log.
    pub address: Address,
    /// topics[0] is the event signature hash; the rest are indexed params.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed params.
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    /// Position of the log within its block.
    pub log_index: u64,
}

impl RawLog {
    /// Transaction hash as `0x`-prefixed hex, used in diagnostics.
    pub fn tx_hash_hex(&self) -> String {
        format!("{:#x}", self.transaction_hash)
    }
}

// ─── Run state ────────────────────────────────────────────────────────────────

/// Runtime state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerState {
    /// Not yet started.
    Idle,
    /// Reading the checkpoint and the chain head.
    ResolvingStart,
    /// Walking block ranges up to the sampled head.
    Scanning,
    /// Last run finished its backlog.
    Stopped,
    /// Last run observed cancellation.
    Cancelled,
    /// Last run aborted on a fetch failure.
    Failed,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ResolvingStart => write!(f, "resolving-start"),
            Self::Scanning => write!(f, "scanning"),
            Self::Stopped => write!(f, "stopped"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every block up to the head sampled at run entry was scanned.
    Completed,
    /// The cancellation token fired.
    Cancelled,
}

/// Counters for one run of the scan loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Block the run started at, if it got that far.
    pub start_block: Option<u64>,
    /// Chain head sampled at run entry.
    pub latest_height: Option<u64>,
    pub ranges_scanned: u64,
    pub logs_fetched: u64,
    pub events_enqueued: u64,
    pub events_dropped: u64,
    pub decode_failures: u64,
    /// Checkpoint value persisted when the run ended.
    pub checkpoint: Option<u64>,
}

impl RunSummary {
    /// Summary for a run that has not processed anything yet.
    pub fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            start_block: None,
            latest_height: None,
            ranges_scanned: 0,
            logs_fetched: 0,
            events_enqueued: 0,
            events_dropped: 0,
            decode_failures: 0,
            checkpoint: None,
        }
    }
}
