//! chainlisten-core: foundation for the checkpointed contract-event listener.
//!
//! # Architecture
//!
//! ```text
//! ListenerBuilder → Listener
//!                      ├── ChainReader        (head height, filtered logs)
//!                      ├── LogDecoder         (raw log → typed event)
//!                      ├── CheckpointManager  (resume position, monotonic writes)
//!                      ├── DispatchQueue      (bounded, drop-on-full)
//!                      └── EventSink          (domain consumer)
//! ```
//!
//! The listener itself lives in `chainlisten-evm`; this crate holds the
//! chain-agnostic contracts it is built from.

pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod decoder;
pub mod error;
pub mod membership;
pub mod metrics;
pub mod queue;
pub mod reader;
pub mod retry;
pub mod sink;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use config::{ListenerConfig, ResumeMode};
pub use cursor::ScanCursor;
pub use decoder::{DecodeFn, LogDecoder};
pub use error::{DecodeError, FetchError, ListenerError};
pub use membership::{MembershipRecord, MembershipRepository, STATUS_ACTIVE};
pub use metrics::{ListenerMetrics, MetricsSnapshot};
pub use queue::{dispatch_queue, run_dispatch, DispatchReceiver, DispatchSender, PushOutcome};
pub use reader::ChainReader;
pub use retry::RetryPolicy;
pub use sink::EventSink;
pub use types::{BlockRange, ListenerState, RawLog, RunOutcome, RunSummary};
