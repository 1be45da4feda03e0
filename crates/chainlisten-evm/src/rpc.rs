//! [`ChainReader`] over HTTP JSON-RPC (`eth_blockNumber`, `eth_getLogs`).
//!
//! Failure classification:
//! - transport errors, HTTP 429 / 5xx, undecodable bodies → `Transient`
//! - HTTP 4xx other than 429 → `Fatal`
//! - JSON-RPC `-32600` (invalid request) / `-32602` (invalid params) → `Fatal`
//! - any other JSON-RPC error → `Transient`

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainlisten_core::{BlockRange, ChainReader, FetchError, RawLog};

const INVALID_REQUEST: i64 = -32600;
const INVALID_PARAMS: i64 = -32602;

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A log as returned by `eth_getLogs`, all quantities hex-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct WireLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl WireLog {
    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    pub fn into_raw(self) -> Result<RawLog, FetchError> {
        Ok(RawLog {
            address: parse_address(&self.address)?,
            topics: self
                .topics
                .iter()
                .map(|t| parse_b256(t))
                .collect::<Result<_, _>>()?,
            data: Bytes::from(decode_hex(&self.data)?),
            block_number: parse_hex_u64(&self.block_number)?,
            transaction_hash: parse_b256(&self.transaction_hash)?,
            log_index: parse_hex_u64(&self.log_index)?,
        })
    }
}

// ─── Classification ───────────────────────────────────────────────────────────

/// Map a non-2xx HTTP status to a fetch error.
pub fn classify_http_status(status: u16, body: &str) -> FetchError {
    let msg = format!("HTTP {status}: {body}");
    match status {
        429 => FetchError::Transient(msg),
        400..=499 => FetchError::Fatal(msg),
        _ => FetchError::Transient(msg),
    }
}

/// Map a JSON-RPC error object to a fetch error.
pub fn classify_rpc_error(err: JsonRpcError) -> FetchError {
    match err.code {
        INVALID_REQUEST | INVALID_PARAMS => FetchError::Fatal(err.to_string()),
        _ => FetchError::Transient(err.to_string()),
    }
}

// ─── Hex helpers ──────────────────────────────────────────────────────────────

fn undecodable(what: &str, s: &str, reason: impl std::fmt::Display) -> FetchError {
    FetchError::Transient(format!("undecodable {what} '{s}': {reason}"))
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(s: &str) -> Result<u64, FetchError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| undecodable("quantity", s, e))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, FetchError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| undecodable("hex data", s, e))
}

fn parse_b256(s: &str) -> Result<B256, FetchError> {
    let bytes = decode_hex(s)?;
    if bytes.len() != 32 {
        return Err(undecodable("hash", s, format!("{} bytes", bytes.len())));
    }
    Ok(B256::from_slice(&bytes))
}

fn parse_address(s: &str) -> Result<Address, FetchError> {
    let bytes = decode_hex(s)?;
    if bytes.len() != 20 {
        return Err(undecodable("address", s, format!("{} bytes", bytes.len())));
    }
    Ok(Address::from_slice(&bytes))
}

fn quantity(n: u64) -> String {
    format!("0x{n:x}")
}

// ─── Reader ───────────────────────────────────────────────────────────────────

/// HTTP JSON-RPC chain reader backed by `reqwest`.
///
/// Performs no retries of its own; the listener owns the retry policy.
pub struct HttpChainReader {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpChainReader {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, FetchError> {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("{method}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http_status(status.as_u16(), &body));
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("{method}: undecodable response: {e}")))?;
        body.into_result().map_err(classify_rpc_error)
    }
}

#[async_trait]
impl ChainReader for HttpChainReader {
    async fn latest_height(&self) -> Result<u64, FetchError> {
        let value = self.call("eth_blockNumber", vec![]).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| undecodable("eth_blockNumber result", &value.to_string(), "not a string"))?;
        parse_hex_u64(hex)
    }

    async fn fetch_logs(
        &self,
        address: Address,
        range: BlockRange,
    ) -> Result<Vec<RawLog>, FetchError> {
        let filter = json!({
            "address": format!("{address:#x}"),
            "fromBlock": quantity(range.from),
            "toBlock": quantity(range.to),
        });
        let value = self.call("eth_getLogs", vec![filter]).await?;
        let wire: Vec<WireLog> = serde_json::from_value(value)
            .map_err(|e| FetchError::Transient(format!("eth_getLogs: undecodable logs: {e}")))?;

        let mut logs = wire
            .into_iter()
            .filter(|l| !l.is_removed())
            .map(WireLog::into_raw)
            .collect::<Result<Vec<_>, _>>()?;
        logs.sort_by_key(|l| (l.block_number, l.log_index));

        tracing::debug!(%range, count = logs.len(), "fetched logs");
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(block: &str, index: &str) -> WireLog {
        WireLog {
            address: format!("0x{}", "11".repeat(20)),
            topics: vec![format!("0x{}", "ab".repeat(32))],
            data: "0x0102".into(),
            block_number: block.into(),
            transaction_hash: format!("0x{}", "ee".repeat(32)),
            log_index: index.into(),
            removed: None,
        }
    }

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
        assert_eq!(parse_hex_u64("0x12a05f200").unwrap(), 5_000_000_000);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn wire_log_converts() {
        let raw = wire("0x3e8", "0x5").into_raw().unwrap();
        assert_eq!(raw.block_number, 1000);
        assert_eq!(raw.log_index, 5);
        assert_eq!(raw.address, Address::repeat_byte(0x11));
        assert_eq!(raw.topics, vec![B256::repeat_byte(0xab)]);
        assert_eq!(raw.data.as_ref(), &[1u8, 2]);
    }

    #[test]
    fn wire_log_bad_topic_is_transient() {
        let mut w = wire("0x1", "0x0");
        w.topics = vec!["0x1234".into()];
        assert!(w.into_raw().unwrap_err().is_retryable());
    }

    #[test]
    fn wire_log_deserializes_from_node_json() {
        let v = json!({
            "address": format!("0x{}", "11".repeat(20)),
            "topics": [],
            "data": "0x",
            "blockNumber": "0x10",
            "blockHash": format!("0x{}", "00".repeat(32)),
            "transactionHash": format!("0x{}", "ee".repeat(32)),
            "transactionIndex": "0x0",
            "logIndex": "0x1",
            "removed": true
        });
        let w: WireLog = serde_json::from_value(v).unwrap();
        assert!(w.is_removed());
        assert_eq!(w.into_raw().unwrap().block_number, 16);
    }

    #[test]
    fn http_status_classification() {
        assert!(classify_http_status(429, "").is_retryable());
        assert!(classify_http_status(503, "").is_retryable());
        assert!(!classify_http_status(400, "bad").is_retryable());
        assert!(!classify_http_status(404, "").is_retryable());
    }

    #[test]
    fn rpc_error_classification() {
        let err = |code| JsonRpcError {
            code,
            message: "x".into(),
        };
        assert!(!classify_rpc_error(err(-32602)).is_retryable());
        assert!(!classify_rpc_error(err(-32600)).is_retryable());
        assert!(classify_rpc_error(err(-32005)).is_retryable());
        assert!(classify_rpc_error(err(-32000)).is_retryable());
    }

    #[test]
    fn response_into_result() {
        let ok: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc":"2.0","id":1,"result":"0x10"})).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!("0x10"));

        let err: JsonRpcResponse = serde_json::from_value(
            json!({"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid params"}}),
        )
        .unwrap();
        assert_eq!(err.into_result().unwrap_err().code, -32602);
    }
}
