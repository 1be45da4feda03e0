//! Domain consumer at the end of the pipeline.

use async_trait::async_trait;

use crate::error::ListenerError;

/// Receives decoded events from the dispatch loop, in ingestion order.
///
/// Errors are logged by the dispatch loop and never retried; a sink must
/// tolerate seeing the same event again after a restart.
#[async_trait]
pub trait EventSink<E>: Send + Sync {
    async fn handle(&self, event: E) -> Result<(), ListenerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "sink"
    }
}
