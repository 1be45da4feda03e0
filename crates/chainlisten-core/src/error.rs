//! Error types for the listener pipeline.

use thiserror::Error;

use crate::types::BlockRange;

/// Errors returned by a [`ChainReader`](crate::reader::ChainReader).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Network or node-side hiccup, worth another attempt.
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// The request itself is wrong (malformed filter, rejected params).
    #[error("fatal fetch error: {0}")]
    Fatal(String),
}

impl FetchError {
    /// Returns `true` if the request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors that can occur while decoding a single log.
///
/// Every variant carries the transaction hash of the offending log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log in tx {tx_hash} has no topics")]
    MissingSignature { tx_hash: String },

    #[error("log in tx {tx_hash} has unknown event signature {topic0}")]
    UnknownEvent { tx_hash: String, topic0: String },

    #[error("log in tx {tx_hash}: expected {expected} indexed topics, got {got}")]
    TopicCountMismatch {
        tx_hash: String,
        expected: usize,
        got: usize,
    },

    #[error("log in tx {tx_hash}: field '{field}' is not a valid {expected}")]
    TypeMismatch {
        tx_hash: String,
        field: String,
        expected: String,
    },

    #[error("log in tx {tx_hash}: missing field '{field}'")]
    MissingField { tx_hash: String, field: String },

    #[error("log in tx {tx_hash}: ABI decode failed: {reason}")]
    AbiDecodeFailed { tx_hash: String, reason: String },
}

impl DecodeError {
    /// Transaction hash of the log that failed to decode.
    pub fn tx_hash(&self) -> &str {
        match self {
            Self::MissingSignature { tx_hash }
            | Self::UnknownEvent { tx_hash, .. }
            | Self::TopicCountMismatch { tx_hash, .. }
            | Self::TypeMismatch { tx_hash, .. }
            | Self::MissingField { tx_hash, .. }
            | Self::AbiDecodeFailed { tx_hash, .. } => tx_hash,
        }
    }
}

/// Errors that end a listener run (or come back from a collaborator).
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Non-retryable fetch failure.
    #[error("fetch failed: {0}")]
    Fetch(FetchError),

    #[error("fetch of blocks {range} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        range: BlockRange,
        attempts: u32,
        last_error: FetchError,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Sink error in '{sink}': {reason}")]
    Sink { sink: String, reason: String },

    #[error("dispatch queue closed while the listener was still running")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ListenerError {
    /// Returns `true` if a later run may succeed (the node was only unreachable).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RetriesExhausted { .. } | Self::Fetch(FetchError::Transient(_))
        )
    }
}

impl From<FetchError> for ListenerError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_retryable() {
        assert!(FetchError::Transient("timeout".into()).is_retryable());
        assert!(!FetchError::Fatal("bad filter".into()).is_retryable());
    }

    #[test]
    fn decode_error_carries_tx_hash() {
        let e = DecodeError::TopicCountMismatch {
            tx_hash: "0xdead".into(),
            expected: 2,
            got: 1,
        };
        assert_eq!(e.tx_hash(), "0xdead");
        assert!(e.to_string().contains("0xdead"));
    }

    #[test]
    fn retries_exhausted_message() {
        let e = ListenerError::RetriesExhausted {
            range: BlockRange::new(10, 20),
            attempts: 3,
            last_error: FetchError::Transient("connection reset".into()),
        };
        assert!(e.is_transient());
        assert!(!ListenerError::Fetch(FetchError::Fatal("bad".into())).is_transient());
        assert_eq!(
            e.to_string(),
            "fetch of blocks [10, 20] failed after 3 attempts: transient fetch error: connection reset"
        );
    }
}
