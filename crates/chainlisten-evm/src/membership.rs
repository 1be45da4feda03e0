//! Membership contract: `MembershipPurchased` decoding and persistence.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tracing::{debug, info};

use chainlisten_core::{
    DecodeError, EventSink, ListenerError, LogDecoder, MembershipRecord, MembershipRepository,
    RawLog, STATUS_ACTIVE,
};

use crate::abi::{AbiError, AbiEventDecoder, DecodedLog};

/// ABI entry of the membership contract's purchase event.
pub const MEMBERSHIP_PURCHASED_ABI: &str = r#"[
  {
    "type": "event",
    "name": "MembershipPurchased",
    "anonymous": false,
    "inputs": [
      { "name": "user",     "type": "address", "indexed": true,  "internalType": "address" },
      { "name": "amount",   "type": "uint256", "indexed": false, "internalType": "uint256" },
      { "name": "orderId",  "type": "uint64",  "indexed": true,  "internalType": "uint64" },
      { "name": "duration", "type": "uint8",   "indexed": false, "internalType": "uint8" }
    ]
  }
]"#;

pub const MEMBERSHIP_PURCHASED: &str = "MembershipPurchased";

/// Plan length by duration code.
pub fn duration_days(code: u8) -> Option<i64> {
    match code {
        0 => Some(365),
        1 => Some(1095),
        _ => None,
    }
}

/// A decoded membership purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipPurchased {
    pub user: Address,
    pub amount: U256,
    pub order_id: u64,
    /// Plan code, see [`duration_days`].
    pub duration: u8,
    pub transaction_hash: B256,
    pub block_number: u64,
}

/// Decodes `MembershipPurchased` logs into [`MembershipPurchased`].
#[derive(Debug, Clone)]
pub struct MembershipDecoder {
    inner: AbiEventDecoder,
}

impl MembershipDecoder {
    pub fn new() -> Result<Self, AbiError> {
        Self::with_abi(MEMBERSHIP_PURCHASED_ABI)
    }

    /// Use a full contract ABI that contains `MembershipPurchased`.
    pub fn with_abi(abi_json: &str) -> Result<Self, AbiError> {
        Ok(Self {
            inner: AbiEventDecoder::from_abi_json(abi_json, MEMBERSHIP_PURCHASED)?,
        })
    }

    pub fn abi_decoder(&self) -> &AbiEventDecoder {
        &self.inner
    }
}

impl LogDecoder for MembershipDecoder {
    type Event = MembershipPurchased;

    fn decode(&self, log: &RawLog) -> Result<MembershipPurchased, DecodeError> {
        let decoded = self.inner.decode_log(log)?;
        let tx_hash = log.tx_hash_hex();

        Ok(MembershipPurchased {
            user: address_field(&decoded, "user", &tx_hash)?,
            amount: uint_field(&decoded, "amount", &tx_hash)?,
            order_id: narrow(&decoded, "orderId", &tx_hash, "uint64")?,
            duration: narrow(&decoded, "duration", &tx_hash, "uint8")?,
            transaction_hash: log.transaction_hash,
            block_number: log.block_number,
        })
    }
}

fn field<'a>(
    decoded: &'a DecodedLog,
    name: &str,
    tx_hash: &str,
) -> Result<&'a DynSolValue, DecodeError> {
    decoded.get(name).ok_or_else(|| DecodeError::MissingField {
        tx_hash: tx_hash.to_string(),
        field: name.to_string(),
    })
}

fn mismatch(name: &str, tx_hash: &str, expected: &str) -> DecodeError {
    DecodeError::TypeMismatch {
        tx_hash: tx_hash.to_string(),
        field: name.to_string(),
        expected: expected.to_string(),
    }
}

fn address_field(decoded: &DecodedLog, name: &str, tx_hash: &str) -> Result<Address, DecodeError> {
    match field(decoded, name, tx_hash)? {
        DynSolValue::Address(a) => Ok(*a),
        _ => Err(mismatch(name, tx_hash, "address")),
    }
}

fn uint_field(decoded: &DecodedLog, name: &str, tx_hash: &str) -> Result<U256, DecodeError> {
    match field(decoded, name, tx_hash)? {
        DynSolValue::Uint(v, _) => Ok(*v),
        _ => Err(mismatch(name, tx_hash, "uint")),
    }
}

fn narrow<T: TryFrom<U256>>(
    decoded: &DecodedLog,
    name: &str,
    tx_hash: &str,
    expected: &str,
) -> Result<T, DecodeError> {
    let v = uint_field(decoded, name, tx_hash)?;
    T::try_from(v).map_err(|_| mismatch(name, tx_hash, expected))
}

/// Persists purchases through a [`MembershipRepository`].
///
/// An event whose order id and transaction hash are already stored is
/// skipped, so rescanning a block does not create duplicate rows.
pub struct MembershipSink<R> {
    repo: R,
}

impl<R: MembershipRepository> MembershipSink<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Build the record stored for `event`, with `now` as a Unix timestamp.
    pub fn record_for(
        &self,
        event: &MembershipPurchased,
        now: i64,
    ) -> Result<MembershipRecord, ListenerError> {
        let days = duration_days(event.duration).ok_or_else(|| ListenerError::Sink {
            sink: "membership".to_string(),
            reason: format!(
                "order {}: unknown duration code {}",
                event.order_id, event.duration
            ),
        })?;
        Ok(MembershipRecord {
            id: 0,
            user_address: event.user.to_checksum(None),
            order_id: event.order_id,
            transaction_hash: format!("{:#x}", event.transaction_hash),
            amount: event.amount.to_string(),
            status: STATUS_ACTIVE,
            created_at: now,
            end_duration: now + days * 86_400,
        })
    }
}

#[async_trait]
impl<R: MembershipRepository> EventSink<MembershipPurchased> for MembershipSink<R> {
    async fn handle(&self, event: MembershipPurchased) -> Result<(), ListenerError> {
        let record = self.record_for(&event, chrono::Utc::now().timestamp())?;
        if let Some(existing) = self.repo.membership_by_order_id(record.order_id).await? {
            if existing.transaction_hash == record.transaction_hash {
                debug!(
                    id = existing.id,
                    order_id = existing.order_id,
                    block = event.block_number,
                    "membership already stored, skipping"
                );
                return Ok(());
            }
        }
        let saved = self.repo.create_membership_event(record).await?;
        info!(
            id = saved.id,
            order_id = saved.order_id,
            user = %saved.user_address,
            block = event.block_number,
            "membership created"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "membership"
    }
}
