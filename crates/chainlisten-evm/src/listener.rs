//! The listener: a chunked, checkpointed, retrying log scanner (producer)
//! feeding a bounded queue drained by a dispatch loop (consumer).
//!
//! # One run
//! 1. Sample the chain head once.
//! 2. Resolve the start block from the checkpoint (or `head - offset`).
//! 3. Walk `[cursor, head]` in ranges of at most `max_block_range` blocks.
//!    Each range is fetched with a fixed-delay retry, its logs decoded and
//!    pushed to the queue without waiting. Every accepted event moves the
//!    checkpoint to its block.
//!
//! With `poll_interval_ms` set, [`Listener::spawn`] repeats runs until
//! cancelled, each continuing from where the last one stopped; otherwise it performs a single run and lets the consumer drain.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::Address;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use chainlisten_core::{
    dispatch_queue, run_dispatch, CheckpointManager, ChainReader, DispatchSender, EventSink,
    FetchError, ListenerConfig, ListenerError, ListenerMetrics, ListenerState, LogDecoder,
    MetricsSnapshot, PushOutcome, RetryPolicy, RunOutcome, RunSummary, ScanCursor,
};

/// Outcome of a fetch raced against cancellation and retried.
enum Fetched<T> {
    Ok(T),
    Cancelled,
    Failed { attempts: u32, error: FetchError },
}

async fn fetch_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    metrics: &ListenerMetrics,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Fetched<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Fetched::Cancelled,
            r = op() => r,
        };

        let error = match result {
            Ok(value) => return Fetched::Ok(value),
            Err(e) => e,
        };
        if !error.is_retryable() {
            error!(attempt, error = %error, what, "fetch failed (not retryable)");
            return Fetched::Failed {
                attempts: attempt,
                error,
            };
        }
        match policy.next_delay(attempt) {
            Some(delay) => {
                metrics.record_retry(1);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    what,
                    "fetch failed, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Fetched::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                error!(attempt, error = %error, what, "max retries exceeded");
                return Fetched::Failed {
                    attempts: attempt,
                    error,
                };
            }
        }
    }
}

/// A configured listener for one contract. Build with
/// [`ListenerBuilder`](crate::ListenerBuilder).
pub struct Listener<E> {
    pub(crate) config: ListenerConfig,
    pub(crate) contract: Address,
    pub(crate) reader: Arc<dyn ChainReader>,
    pub(crate) decoder: Box<dyn LogDecoder<Event = E>>,
    pub(crate) checkpoints: CheckpointManager,
    pub(crate) retry: RetryPolicy,
    pub(crate) metrics: Arc<ListenerMetrics>,
    pub(crate) span: Span,
    pub(crate) state: ListenerState,
    /// Where the previous run in this process stopped; `None` before the first.
    pub(crate) cursor: Option<ScanCursor>,
}

impl<E: Send + 'static> Listener<E> {
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn metrics(&self) -> Arc<ListenerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Scan once from the resolved start up to the head sampled at entry.
    ///
    /// The first run starts from the checkpoint (or `head - offset`); later
    /// runs on the same listener continue after the last scanned range.
    ///
    /// Cancellation is reported as [`RunOutcome::Cancelled`], not an error.
    pub async fn run_once(
        &mut self,
        queue: &DispatchSender<E>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ListenerError> {
        let result = self.scan(queue, cancel).await;
        self.state = match &result {
            Ok(s) if s.outcome == RunOutcome::Cancelled => ListenerState::Cancelled,
            Ok(_) => ListenerState::Stopped,
            Err(_) => ListenerState::Failed,
        };
        result
    }

    async fn scan(
        &mut self,
        queue: &DispatchSender<E>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ListenerError> {
        self.state = ListenerState::ResolvingStart;
        let mut summary = RunSummary::new(RunOutcome::Completed);

        let reader = Arc::clone(&self.reader);
        let latest = match fetch_with_retry(&self.retry, &self.metrics, cancel, "chain head", || {
            reader.latest_height()
        })
        .await
        {
            Fetched::Ok(height) => height,
            Fetched::Cancelled => return Ok(self.cancelled(summary)),
            Fetched::Failed { error, .. } => return Err(ListenerError::Fetch(error)),
        };
        summary.latest_height = Some(latest);

        let checkpoint = self.checkpoints.last_processed_block().await?;
        let mut cursor = match self.cursor {
            Some(previous) => ScanCursor::continue_from(previous, checkpoint, self.config.resume),
            None => ScanCursor::resolve(
                checkpoint,
                latest,
                self.config.default_block_offset,
                self.config.resume,
            ),
        };
        self.cursor = Some(cursor);
        summary.start_block = Some(cursor.position);
        info!(
            start = cursor.position,
            latest,
            checkpoint = ?checkpoint,
            "starting scan"
        );

        self.state = ListenerState::Scanning;
        let contract = self.contract;
        while let Some(range) = cursor.next_range(latest, self.config.max_block_range) {
            let what = format!("logs {range}");
            let logs = match fetch_with_retry(&self.retry, &self.metrics, cancel, &what, || {
                reader.fetch_logs(contract, range)
            })
            .await
            {
                Fetched::Ok(logs) => logs,
                Fetched::Cancelled => return Ok(self.cancelled(summary)),
                Fetched::Failed { attempts, error } if error.is_retryable() => {
                    return Err(ListenerError::RetriesExhausted {
                        range,
                        attempts,
                        last_error: error,
                    })
                }
                Fetched::Failed { error, .. } => return Err(ListenerError::Fetch(error)),
            };

            summary.ranges_scanned += 1;
            summary.logs_fetched += logs.len() as u64;
            self.metrics.record_range(1);
            self.metrics.record_logs(logs.len() as u64);
            debug!(%range, logs = logs.len(), "scanned range");

            for log in &logs {
                let event = match self.decoder.decode(log) {
                    Ok(event) => event,
                    Err(e) => {
                        summary.decode_failures += 1;
                        self.metrics.record_decode_error(1);
                        warn!(
                            tx_hash = e.tx_hash(),
                            block = log.block_number,
                            error = %e,
                            "failed to decode log, skipping"
                        );
                        continue;
                    }
                };

                if cancel.is_cancelled() {
                    return Ok(self.cancelled(summary));
                }
                match queue.try_push(event) {
                    PushOutcome::Accepted => {
                        summary.events_enqueued += 1;
                        self.metrics.record_enqueued(1);
                        if let Err(e) = self
                            .checkpoints
                            .update_last_processed_block(log.block_number)
                            .await
                        {
                            self.metrics.record_checkpoint_error(1);
                            error!(block = log.block_number, error = %e, "failed to update checkpoint");
                        }
                    }
                    PushOutcome::Full => {
                        summary.events_dropped += 1;
                        self.metrics.record_dropped(1);
                        warn!(
                            block = log.block_number,
                            tx_hash = %log.tx_hash_hex(),
                            capacity = self.config.queue_capacity,
                            "dispatch queue full, dropping event"
                        );
                    }
                    PushOutcome::Closed => {
                        if cancel.is_cancelled() {
                            return Ok(self.cancelled(summary));
                        }
                        return Err(ListenerError::QueueClosed);
                    }
                }
            }

            if range.to == u64::MAX {
                break;
            }
            cursor.advance_past(&range);
            self.cursor = Some(cursor);
        }

        summary.checkpoint = self.checkpoints.persisted();
        info!(
            ranges = summary.ranges_scanned,
            logs = summary.logs_fetched,
            enqueued = summary.events_enqueued,
            dropped = summary.events_dropped,
            decode_failures = summary.decode_failures,
            checkpoint = ?summary.checkpoint,
            "scan complete"
        );
        Ok(summary)
    }

    fn cancelled(&self, mut summary: RunSummary) -> RunSummary {
        info!("listener cancelled");
        summary.outcome = RunOutcome::Cancelled;
        summary.checkpoint = self.checkpoints.persisted();
        summary
    }

    /// Start the producer and consumer tasks.
    pub fn spawn(self, sink: Arc<dyn EventSink<E>>, cancel: CancellationToken) -> ListenerHandle {
        let (tx, rx) = dispatch_queue(self.config.queue_capacity);
        let metrics = self.metrics();
        let span = self.span.clone();

        let consumer = tokio::spawn(
            run_dispatch(rx, sink, cancel.clone(), Arc::clone(&metrics)).instrument(span.clone()),
        );
        let producer = tokio::spawn(self.produce(tx, cancel.clone()).instrument(span));

        ListenerHandle {
            producer,
            consumer,
            cancel,
            metrics,
        }
    }

    async fn produce(
        mut self,
        queue: DispatchSender<E>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, ListenerError> {
        let Some(interval) = self.config.poll_interval() else {
            return self.run_once(&queue, &cancel).await;
        };

        loop {
            match self.run_once(&queue, &cancel).await {
                Ok(summary) if summary.outcome == RunOutcome::Cancelled => return Ok(summary),
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "run failed, retrying next poll");
                }
                Err(e) => {
                    error!(error = %e, "listener stopped");
                    return Err(e);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.state = ListenerState::Cancelled;
                    let mut summary = RunSummary::new(RunOutcome::Cancelled);
                    summary.checkpoint = self.checkpoints.persisted();
                    return Ok(summary);
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// Handle to a spawned listener.
pub struct ListenerHandle {
    producer: JoinHandle<Result<RunSummary, ListenerError>>,
    consumer: JoinHandle<()>,
    cancel: CancellationToken,
    metrics: Arc<ListenerMetrics>,
}

impl ListenerHandle {
    /// Request shutdown of both tasks.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait for both tasks and return the producer's last run result.
    pub async fn join(self) -> Result<RunSummary, ListenerError> {
        let result = self
            .producer
            .await
            .map_err(|e| ListenerError::Other(format!("producer task failed: {e}")))?;
        self.consumer
            .await
            .map_err(|e| ListenerError::Other(format!("consumer task failed: {e}")))?;
        result
    }
}
