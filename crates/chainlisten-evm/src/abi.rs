//! ABI-driven event decoding built on alloy-rs.
//!
//! An [`EventSignature`] is parsed from a JSON ABI (a whole contract ABI or a
//! single event entry). [`AbiEventDecoder`] applies it to raw logs:
//!
//! - `topics[0]` must equal keccak256 of the canonical signature and is not
//!   exposed as a field
//! - `topics[1..]` are the indexed params in declaration order
//! - `data` is the ABI-encoded sequence of non-indexed params

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::{Event, JsonAbi};
use alloy_primitives::{Address, B256};
use thiserror::Error;

use chainlisten_core::{DecodeError, ListenerError, LogDecoder, RawLog};

/// Errors raised while building an [`EventSignature`].
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("invalid ABI JSON: {0}")]
    InvalidJson(String),

    #[error("event '{0}' not found in ABI")]
    EventNotFound(String),

    #[error("event '{0}' is overloaded in the ABI; supply the single entry instead")]
    Ambiguous(String),

    #[error("event '{0}' is anonymous and has no signature topic")]
    Anonymous(String),

    #[error("event '{event}': cannot resolve type of '{param}': {reason}")]
    UnresolvedType {
        event: String,
        param: String,
        reason: String,
    },
}

impl From<AbiError> for ListenerError {
    fn from(e: AbiError) -> Self {
        ListenerError::Config(e.to_string())
    }
}

#[derive(Debug, Clone)]
struct Param {
    name: String,
    ty: DynSolType,
    indexed: bool,
}

/// A parsed, resolved event definition.
#[derive(Debug, Clone)]
pub struct EventSignature {
    name: String,
    canonical: String,
    selector: B256,
    params: Vec<Param>,
    body_types: Vec<DynSolType>,
    indexed_count: usize,
}

impl EventSignature {
    /// Parse `name` out of a JSON ABI.
    ///
    /// `json` may be a full contract ABI (array) or a single event object.
    pub fn from_abi_json(json: &str, name: &str) -> Result<Self, AbiError> {
        let trimmed = json.trim_start();
        let abi: JsonAbi = if trimmed.starts_with('{') {
            serde_json::from_str(&format!("[{trimmed}]"))
        } else {
            serde_json::from_str(trimmed)
        }
        .map_err(|e| AbiError::InvalidJson(e.to_string()))?;

        let events = abi
            .events
            .get(name)
            .ok_or_else(|| AbiError::EventNotFound(name.to_string()))?;
        match events.as_slice() {
            [event] => Self::from_event(event),
            [] => Err(AbiError::EventNotFound(name.to_string())),
            _ => Err(AbiError::Ambiguous(name.to_string())),
        }
    }

    pub fn from_event(event: &Event) -> Result<Self, AbiError> {
        if event.anonymous {
            return Err(AbiError::Anonymous(event.name.clone()));
        }

        let mut params = Vec::with_capacity(event.inputs.len());
        for (i, input) in event.inputs.iter().enumerate() {
            let name = if input.name.is_empty() {
                format!("arg{i}")
            } else {
                input.name.clone()
            };
            let ty = input.resolve().map_err(|e| AbiError::UnresolvedType {
                event: event.name.clone(),
                param: name.clone(),
                reason: e.to_string(),
            })?;
            params.push(Param {
                name,
                ty,
                indexed: input.indexed,
            });
        }

        let body_types = params
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.ty.clone())
            .collect();
        let indexed_count = params.iter().filter(|p| p.indexed).count();

        Ok(Self {
            name: event.name.clone(),
            canonical: event.signature(),
            selector: event.selector(),
            params,
            body_types,
            indexed_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// e.g. `Transfer(address,address,uint256)`.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Expected `topics[0]`.
    pub fn selector(&self) -> B256 {
        self.selector
    }

    /// Number of indexed params (topics after the selector).
    pub fn indexed_count(&self) -> usize {
        self.indexed_count
    }
}

/// A log decoded against an [`EventSignature`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub event: String,
    /// Params in declaration order.
    pub fields: Vec<(String, DynSolValue)>,
    pub address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
}

impl DecodedLog {
    pub fn get(&self, name: &str) -> Option<&DynSolValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Generic [`LogDecoder`] producing [`DecodedLog`]s.
#[derive(Debug, Clone)]
pub struct AbiEventDecoder {
    signature: EventSignature,
}

impl AbiEventDecoder {
    pub fn new(signature: EventSignature) -> Self {
        Self { signature }
    }

    pub fn from_abi_json(json: &str, name: &str) -> Result<Self, AbiError> {
        EventSignature::from_abi_json(json, name).map(Self::new)
    }

    pub fn signature(&self) -> &EventSignature {
        &self.signature
    }

    pub fn decode_log(&self, log: &RawLog) -> Result<DecodedLog, DecodeError> {
        let sig = &self.signature;
        let tx_hash = log.tx_hash_hex();

        let topic0 = log.topics.first().ok_or_else(|| DecodeError::MissingSignature {
            tx_hash: tx_hash.clone(),
        })?;
        if *topic0 != sig.selector {
            return Err(DecodeError::UnknownEvent {
                tx_hash,
                topic0: format!("{topic0:#x}"),
            });
        }
        let got = log.topics.len() - 1;
        if got != sig.indexed_count {
            return Err(DecodeError::TopicCountMismatch {
                tx_hash,
                expected: sig.indexed_count,
                got,
            });
        }

        let body = decode_body(&sig.body_types, &log.data, &tx_hash)?;
        let mut body = body.into_iter();
        let mut topics = log.topics[1..].iter();

        let mut fields = Vec::with_capacity(sig.params.len());
        for param in &sig.params {
            let value = if param.indexed {
                // count already checked above
                match topics.next() {
                    Some(topic) => decode_topic(&param.ty, topic, &param.name, &tx_hash)?,
                    None => {
                        return Err(DecodeError::MissingField {
                            tx_hash,
                            field: param.name.clone(),
                        })
                    }
                }
            } else {
                body.next().ok_or_else(|| DecodeError::MissingField {
                    tx_hash: tx_hash.clone(),
                    field: param.name.clone(),
                })?
            };
            fields.push((param.name.clone(), value));
        }

        Ok(DecodedLog {
            event: sig.name.clone(),
            fields,
            address: log.address,
            transaction_hash: log.transaction_hash,
            block_number: log.block_number,
            log_index: log.log_index,
        })
    }
}

impl LogDecoder for AbiEventDecoder {
    type Event = DecodedLog;

    fn decode(&self, log: &RawLog) -> Result<DecodedLog, DecodeError> {
        self.decode_log(log)
    }
}

fn decode_body(
    types: &[DynSolType],
    data: &[u8],
    tx_hash: &str,
) -> Result<Vec<DynSolValue>, DecodeError> {
    if types.is_empty() {
        return Ok(vec![]);
    }
    let decoded = DynSolType::Tuple(types.to_vec())
        .abi_decode_params(data)
        .map_err(|e| DecodeError::AbiDecodeFailed {
            tx_hash: tx_hash.to_string(),
            reason: e.to_string(),
        })?;
    let values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };
    if values.len() != types.len() {
        return Err(DecodeError::AbiDecodeFailed {
            tx_hash: tx_hash.to_string(),
            reason: format!("expected {} values, decoded {}", types.len(), values.len()),
        });
    }
    Ok(values)
}

/// Decode one indexed topic slot.
///
/// Value types are ABI-decoded from the 32-byte word and must be in their
/// canonical encoding. Reference types are stored in topics as their
/// keccak256 hash, so they come back as the raw word.
fn decode_topic(
    ty: &DynSolType,
    topic: &B256,
    field: &str,
    tx_hash: &str,
) -> Result<DynSolValue, DecodeError> {
    let is_value_type = matches!(
        ty,
        DynSolType::Address
            | DynSolType::Bool
            | DynSolType::Uint(_)
            | DynSolType::Int(_)
            | DynSolType::FixedBytes(_)
    );
    if !is_value_type {
        return Ok(DynSolValue::FixedBytes(*topic, 32));
    }

    let value = ty
        .abi_decode(topic.as_slice())
        .map_err(|e| DecodeError::AbiDecodeFailed {
            tx_hash: tx_hash.to_string(),
            reason: format!("topic '{field}': {e}"),
        })?;

    let canonical = match &value {
        DynSolValue::Uint(v, bits) => v.bit_len() <= *bits,
        DynSolValue::Int(v, bits) => {
            let raw = v.into_raw();
            let magnitude = if v.is_negative() { !raw } else { raw };
            magnitude.bit_len() < *bits
        }
        other => other.abi_encode().as_slice() == topic.as_slice(),
    };
    if !canonical {
        return Err(DecodeError::TypeMismatch {
            tx_hash: tx_hash.to_string(),
            field: field.to_string(),
            expected: ty.sol_type_name().into_owned(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{keccak256, Bytes, I256, U256};

    const TRANSFER_ABI: &str = r#"[
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"value","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"event","name":"Transfer","anonymous":false,"inputs":[
            {"name":"from","type":"address","indexed":true},
            {"name":"to","type":"address","indexed":true},
            {"name":"value","type":"uint256","indexed":false}]}
    ]"#;

    const TAGGED_ABI: &str = r#"{"type":"event","name":"Tagged","anonymous":false,"inputs":[
        {"name":"label","type":"string","indexed":true},
        {"name":"flag","type":"bool","indexed":true},
        {"name":"delta","type":"int64","indexed":true},
        {"name":"note","type":"string","indexed":false}]}"#;

    fn word(n: u64) -> B256 {
        B256::from(U256::from(n).to_be_bytes::<32>())
    }

    fn log(topics: Vec<B256>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: Address::repeat_byte(0x11),
            topics,
            data: Bytes::from(data),
            block_number: 7,
            transaction_hash: B256::repeat_byte(0xee),
            log_index: 2,
        }
    }

    fn address_topic(addr: Address) -> B256 {
        let mut w = B256::ZERO;
        w.0[12..].copy_from_slice(addr.as_slice());
        w
    }

    #[test]
    fn selector_is_keccak_of_canonical_signature() {
        let sig = EventSignature::from_abi_json(TRANSFER_ABI, "Transfer").unwrap();
        assert_eq!(sig.canonical(), "Transfer(address,address,uint256)");
        assert_eq!(sig.selector(), keccak256("Transfer(address,address,uint256)"));
        assert_eq!(sig.indexed_count(), 2);
    }

    #[test]
    fn decodes_transfer() {
        let dec = AbiEventDecoder::from_abi_json(TRANSFER_ABI, "Transfer").unwrap();
        let from = Address::repeat_byte(0xaa);
        let to = Address::repeat_byte(0xbb);
        let raw = log(
            vec![dec.signature().selector(), address_topic(from), address_topic(to)],
            word(1_000_000).to_vec(),
        );

        let out = dec.decode(&raw).unwrap();
        assert_eq!(out.event, "Transfer");
        assert_eq!(out.get("from"), Some(&DynSolValue::Address(from)));
        assert_eq!(out.get("to"), Some(&DynSolValue::Address(to)));
        assert_eq!(
            out.get("value"),
            Some(&DynSolValue::Uint(U256::from(1_000_000u64), 256))
        );
        assert_eq!(out.block_number, 7);
        assert_eq!(out.log_index, 2);
    }

    #[test]
    fn missing_topic0() {
        let dec = AbiEventDecoder::from_abi_json(TRANSFER_ABI, "Transfer").unwrap();
        let err = dec.decode(&log(vec![], vec![])).unwrap_err();
        assert!(matches!(err, DecodeError::MissingSignature { .. }));
        assert_eq!(err.tx_hash(), format!("0x{}", "ee".repeat(32)));
    }

    #[test]
    fn wrong_selector_is_unknown_event() {
        let dec = AbiEventDecoder::from_abi_json(TRANSFER_ABI, "Transfer").unwrap();
        let err = dec
            .decode(&log(vec![B256::repeat_byte(1), B256::ZERO, B256::ZERO], vec![]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEvent { .. }));
    }

    #[test]
    fn topic_count_mismatch() {
        let dec = AbiEventDecoder::from_abi_json(TRANSFER_ABI, "Transfer").unwrap();
        let sel = dec.signature().selector();
        let err = dec
            .decode(&log(vec![sel, B256::ZERO], word(1).to_vec()))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::TopicCountMismatch {
                tx_hash: format!("0x{}", "ee".repeat(32)),
                expected: 2,
                got: 1,
            }
        );
    }

    #[test]
    fn short_body_fails_abi_decode() {
        let dec = AbiEventDecoder::from_abi_json(TRANSFER_ABI, "Transfer").unwrap();
        let sel = dec.signature().selector();
        let err = dec
            .decode(&log(vec![sel, B256::ZERO, B256::ZERO], vec![0u8; 5]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::AbiDecodeFailed { .. }));
    }

    #[test]
    fn indexed_reference_and_value_types() {
        let dec = AbiEventDecoder::from_abi_json(TAGGED_ABI, "Tagged").unwrap();
        let label_hash = keccak256("hello");
        let minus_one = B256::repeat_byte(0xff);

        // body: offset 0x20, length 2, "hi" padded
        let mut data = word(32).to_vec();
        data.extend_from_slice(word(2).as_slice());
        let mut text = [0u8; 32];
        text[..2].copy_from_slice(b"hi");
        data.extend_from_slice(&text);

        let raw = log(
            vec![dec.signature().selector(), label_hash, word(1), minus_one],
            data,
        );
        let out = dec.decode(&raw).unwrap();
        assert_eq!(out.get("label"), Some(&DynSolValue::FixedBytes(label_hash, 32)));
        assert_eq!(out.get("flag"), Some(&DynSolValue::Bool(true)));
        assert_eq!(out.get("delta"), Some(&DynSolValue::Int(I256::MINUS_ONE, 64)));
        assert_eq!(out.get("note"), Some(&DynSolValue::String("hi".into())));
    }

    #[test]
    fn oversized_topic_value_is_type_mismatch() {
        let dec = AbiEventDecoder::from_abi_json(TAGGED_ABI, "Tagged").unwrap();
        let sel = dec.signature().selector();
        let mut data = word(32).to_vec();
        data.extend_from_slice(word(0).as_slice());

        let bad_bool = log(vec![sel, B256::ZERO, word(2), B256::ZERO], data.clone());
        assert!(matches!(
            dec.decode(&bad_bool).unwrap_err(),
            DecodeError::TypeMismatch { ref field, .. } if field == "flag"
        ));

        // int64 slot not sign-extended
        let mut wide = B256::ZERO;
        wide.0[0] = 1;
        let bad_int = log(vec![sel, B256::ZERO, word(0), wide], data);
        assert!(matches!(
            dec.decode(&bad_int).unwrap_err(),
            DecodeError::TypeMismatch { ref field, .. } if field == "delta"
        ));
    }

    #[test]
    fn address_topic_with_dirty_high_bytes_is_rejected() {
        let dec = AbiEventDecoder::from_abi_json(TRANSFER_ABI, "Transfer").unwrap();
        let mut dirty = address_topic(Address::repeat_byte(0xaa));
        dirty.0[0] = 0x01;
        let raw = log(
            vec![dec.signature().selector(), dirty, address_topic(Address::ZERO)],
            word(1).to_vec(),
        );
        assert!(matches!(
            dec.decode(&raw).unwrap_err(),
            DecodeError::TypeMismatch { ref field, .. } if field == "from"
        ));
    }

    #[test]
    fn abi_lookup_errors() {
        assert!(matches!(
            EventSignature::from_abi_json(TRANSFER_ABI, "Approval"),
            Err(AbiError::EventNotFound(_))
        ));
        assert!(matches!(
            EventSignature::from_abi_json("not json", "Transfer"),
            Err(AbiError::InvalidJson(_))
        ));
        let anon = r#"{"type":"event","name":"Anon","anonymous":true,"inputs":[]}"#;
        assert!(matches!(
            EventSignature::from_abi_json(anon, "Anon"),
            Err(AbiError::Anonymous(_))
        ));
    }
}
