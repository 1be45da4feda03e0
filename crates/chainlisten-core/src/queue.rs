//! Bounded dispatch queue between the scan loop and the sink.
//!
//! The producer side never waits: a full queue drops the event. The consumer
//! side forwards events to an [`EventSink`] in the order they were accepted.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::ListenerMetrics;
use crate::sink::EventSink;

/// Result of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The event is buffered and will reach the sink.
    Accepted,
    /// The buffer was at capacity; the event was discarded.
    Full,
    /// The consumer is gone; the event was discarded.
    Closed,
}

/// Create a queue holding at most `capacity` events (minimum 1).
pub fn dispatch_queue<E>(capacity: usize) -> (DispatchSender<E>, DispatchReceiver<E>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DispatchSender { tx }, DispatchReceiver { rx })
}

/// Producer half of the dispatch queue.
pub struct DispatchSender<E> {
    tx: mpsc::Sender<E>,
}

impl<E> Clone for DispatchSender<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> DispatchSender<E> {
    pub fn try_push(&self, event: E) -> PushOutcome {
        match self.tx.try_send(event) {
            Ok(()) => PushOutcome::Accepted,
            Err(TrySendError::Full(_)) => PushOutcome::Full,
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the dispatch queue.
pub struct DispatchReceiver<E> {
    rx: mpsc::Receiver<E>,
}

impl<E> DispatchReceiver<E> {
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Stop accepting new events; buffered ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Forward queued events to `sink` until cancelled or every sender is gone.
///
/// Sink errors are logged and counted, never retried. On cancellation any
/// events still buffered are abandoned.
pub async fn run_dispatch<E: Send + 'static>(
    mut rx: DispatchReceiver<E>,
    sink: Arc<dyn EventSink<E>>,
    cancel: CancellationToken,
    metrics: Arc<ListenerMetrics>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(sink = sink.name(), "dispatch loop cancelled");
                break;
            }
            next = rx.recv() => match next {
                Some(event) => event,
                None => {
                    debug!(sink = sink.name(), "dispatch queue drained");
                    break;
                }
            },
        };

        match sink.handle(event).await {
            Ok(()) => metrics.record_delivered(1),
            Err(e) => {
                metrics.record_sink_error(1);
                warn!(sink = sink.name(), error = %e, "sink failed to handle event");
            }
        }
    }
}
