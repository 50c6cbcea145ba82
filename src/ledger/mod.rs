//! Ledger event delivery
//!
//! This module defines the contract of a ledger event source, the typed events it delivers at the
//! tentative and confirmed tiers, and a JSON-RPC implementation that polls a node for contract
//! logs.

/// JSON-RPC polling client
mod client;
/// Log decoding for the subscribed contract events
pub mod decode;
/// Event source contract
mod source;
/// Event and error types
mod types;

pub use client::{JsonRpcEventSource, LedgerRpc, PollConfig, RpcClient};
pub use source::LedgerEventSource;
#[cfg(test)]
pub use source::testing;
pub use types::*;
