//! Membership persistence contract.
//!
//! The listener core knows nothing about memberships; this trait is the seam
//! between `MembershipSink` in `chainlisten-evm` and the storage backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ListenerError;

/// Membership status written for a fresh purchase.
pub const STATUS_ACTIVE: i32 = 1;

/// One persisted membership purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Assigned by the repository; `0` before insertion.
    pub id: i64,
    /// Buyer, EIP-55 checksummed.
    pub user_address: String,
    pub order_id: u64,
    pub transaction_hash: String,
    /// Purchase amount as a base-10 string (uint256 does not fit in SQL integers).
    pub amount: String,
    pub status: i32,
    /// Unix timestamp of insertion.
    pub created_at: i64,
    /// Unix timestamp at which the membership expires.
    pub end_duration: i64,
}

/// Storage for membership purchases.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Insert a record and return it with its assigned id.
    async fn create_membership_event(
        &self,
        record: MembershipRecord,
    ) -> Result<MembershipRecord, ListenerError>;

    /// Most recent record for `order_id`, if any.
    async fn membership_by_order_id(
        &self,
        order_id: u64,
    ) -> Result<Option<MembershipRecord>, ListenerError>;
}

#[async_trait]
impl<T: MembershipRepository + ?Sized> MembershipRepository for std::sync::Arc<T> {
    async fn create_membership_event(
        &self,
        record: MembershipRecord,
    ) -> Result<MembershipRecord, ListenerError> {
        (**self).create_membership_event(record).await
    }

    async fn membership_by_order_id(
        &self,
        order_id: u64,
    ) -> Result<Option<MembershipRecord>, ListenerError> {
        (**self).membership_by_order_id(order_id).await
    }
}
