//! Fluent builder API for creating listeners.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use chainlisten_evm::{HttpChainReader, ListenerBuilder, MembershipDecoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = HttpChainReader::new("http://localhost:8545", Duration::from_secs(10))?;
//! let listener = ListenerBuilder::new()
//!     .id("membership")
//!     .contract("0x5FbDB2315678afecb367f032d93F642f64180aa3".parse()?)
//!     .max_block_range(1000)
//!     .reader(reader)
//!     .decoder(MembershipDecoder::new()?)
//!     .build()?;
//! # let _ = listener;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use alloy_primitives::Address;
use tracing::Span;

use chainlisten_core::{
    ChainReader, CheckpointManager, CheckpointStore, ListenerConfig, ListenerError,
    ListenerMetrics, ListenerState, LogDecoder, MemoryCheckpointStore, ResumeMode, RetryPolicy,
};

use crate::listener::Listener;

/// Fluent builder for [`Listener`].
pub struct ListenerBuilder<E> {
    config: ListenerConfig,
    contract: Option<Address>,
    reader: Option<Arc<dyn ChainReader>>,
    decoder: Option<Box<dyn LogDecoder<Event = E>>>,
    checkpoints: Option<Box<dyn CheckpointStore>>,
    span: Option<Span>,
}

impl<E: Send + 'static> Default for ListenerBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + 'static> ListenerBuilder<E> {
    pub fn new() -> Self {
        Self {
            config: ListenerConfig::default(),
            contract: None,
            reader: None,
            decoder: None,
            checkpoints: None,
            span: None,
        }
    }

    /// Replace all tunables at once.
    pub fn config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the listener ID (used as the checkpoint key).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    pub fn default_block_offset(mut self, offset: u64) -> Self {
        self.config.default_block_offset = offset;
        self
    }

    /// Set the number of blocks per `eth_getLogs` call.
    pub fn max_block_range(mut self, blocks: u64) -> Self {
        self.config.max_block_range = blocks;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set fetch attempts per range and the pause between them.
    pub fn retries(mut self, max_retries: u32, delay_ms: u64) -> Self {
        self.config.max_retries = max_retries;
        self.config.retry_delay_ms = delay_ms;
        self
    }

    pub fn resume(mut self, mode: ResumeMode) -> Self {
        self.config.resume = mode;
        self
    }

    /// Repeat runs every `ms` milliseconds instead of running once.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = Some(ms);
        self
    }

    /// Contract whose logs are scanned.
    pub fn contract(mut self, address: Address) -> Self {
        self.contract = Some(address);
        self
    }

    pub fn reader(mut self, reader: impl ChainReader + 'static) -> Self {
        self.reader = Some(Arc::new(reader));
        self
    }

    /// Share an existing reader between listeners.
    pub fn shared_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn decoder(mut self, decoder: impl LogDecoder<Event = E> + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Checkpoint backend. Defaults to an in-memory store.
    pub fn checkpoints(mut self, store: impl CheckpointStore + 'static) -> Self {
        self.checkpoints = Some(Box::new(store));
        self
    }

    /// Span under which both loops log. Defaults to `listener{id=..}`.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<Listener<E>, ListenerError> {
        self.config.validate()?;
        let contract = self
            .contract
            .ok_or_else(|| ListenerError::Config("contract address is required".into()))?;
        let reader = self
            .reader
            .ok_or_else(|| ListenerError::Config("chain reader is required".into()))?;
        let decoder = self
            .decoder
            .ok_or_else(|| ListenerError::Config("log decoder is required".into()))?;
        let store = self.checkpoints.unwrap_or_else(|| {
            tracing::debug!(id = %self.config.id, "no checkpoint store given, using memory");
            Box::new(MemoryCheckpointStore::new())
        });
        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("listener", id = %self.config.id));

        Ok(Listener {
            contract,
            reader,
            decoder,
            checkpoints: CheckpointManager::new(store, self.config.id.clone()),
            retry: RetryPolicy::from_config(&self.config),
            metrics: Arc::new(ListenerMetrics::new()),
            span,
            state: ListenerState::Idle,
            cursor: None,
            config: self.config,
        })
    }
}
