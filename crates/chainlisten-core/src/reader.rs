//! Node-facing side of the listener.

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::error::FetchError;
use crate::types::{BlockRange, RawLog};

/// Fetches chain head height and contract logs from a node.
///
/// Implementations must be `Send + Sync` so one reader can be shared across
/// listener tasks as `Arc<dyn ChainReader>`.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current chain head.
    async fn latest_height(&self) -> Result<u64, FetchError>;

    /// Logs emitted by `address` within `range` (both bounds inclusive),
    /// ordered by block number then log index.
    async fn fetch_logs(
        &self,
        address: Address,
        range: BlockRange,
    ) -> Result<Vec<RawLog>, FetchError>;
}

#[async_trait]
impl<T: ChainReader + ?Sized> ChainReader for std::sync::Arc<T> {
    async fn latest_height(&self) -> Result<u64, FetchError> {
        (**self).latest_height().await
    }

    async fn fetch_logs(
        &self,
        address: Address,
        range: BlockRange,
    ) -> Result<Vec<RawLog>, FetchError> {
        (**self).fetch_logs(address, range).await
    }
}
