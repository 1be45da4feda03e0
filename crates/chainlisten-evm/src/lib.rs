//! chainlisten-evm: EVM side of ChainListen.
//!
//! - [`HttpChainReader`]: `eth_blockNumber` / `eth_getLogs` over HTTP
//! - [`AbiEventDecoder`]: generic event decoding from a JSON ABI
//! - [`MembershipDecoder`] / [`MembershipSink`]: the membership contract
//! - [`Listener`] / [`ListenerBuilder`]: the scan and dispatch loops

pub mod abi;
pub mod builder;
pub mod listener;
pub mod membership;
pub mod rpc;

pub use abi::{AbiError, AbiEventDecoder, DecodedLog, EventSignature};
pub use builder::ListenerBuilder;
pub use listener::{Listener, ListenerHandle};
pub use membership::{
    duration_days, MembershipDecoder, MembershipPurchased, MembershipSink,
    MEMBERSHIP_PURCHASED, MEMBERSHIP_PURCHASED_ABI,
};
pub use rpc::HttpChainReader;
