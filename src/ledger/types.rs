//! Types for ledger event delivery

use crate::network::{Address, AddressError, ChannelId, TokenAmount};

use std::fmt;

/// Confirmation tier an event was delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventTier {
	/// Seen at the head of the chain, may still be reorganized away.
	Tentative,
	/// Past the reorg-safety depth.
	Confirmed,
}

impl fmt::Display for EventTier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EventTier::Tentative => f.write_str("tentative"),
			EventTier::Confirmed => f.write_str("confirmed"),
		}
	}
}

/// The event kinds the service subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
	ChannelOpened,
	ChannelNewDeposit,
	ChannelClosed,
	TokenNetworkCreated,
}

impl EventKind {
	pub const ALL: [EventKind; 4] = [
		EventKind::ChannelOpened,
		EventKind::ChannelNewDeposit,
		EventKind::ChannelClosed,
		EventKind::TokenNetworkCreated,
	];

	/// Solidity event signature, hashed into the log's first topic.
	pub fn signature(&self) -> &'static str {
		match self {
			EventKind::ChannelOpened => "ChannelOpened(uint256,address,address,uint256)",
			EventKind::ChannelNewDeposit => "ChannelNewDeposit(uint256,address,uint256)",
			EventKind::ChannelClosed => "ChannelClosed(uint256,address)",
			EventKind::TokenNetworkCreated => "TokenNetworkCreated(address,address)",
		}
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// Typed payload of a ledger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
	ChannelOpened {
		channel_id: ChannelId,
		participant1: Address,
		participant2: Address,
	},
	ChannelNewDeposit {
		channel_id: ChannelId,
		participant: Address,
		total_deposit: TokenAmount,
	},
	ChannelClosed {
		channel_id: ChannelId,
	},
	TokenNetworkCreated {
		network_address: Address,
	},
}

impl LedgerEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			LedgerEvent::ChannelOpened { .. } => EventKind::ChannelOpened,
			LedgerEvent::ChannelNewDeposit { .. } => EventKind::ChannelNewDeposit,
			LedgerEvent::ChannelClosed { .. } => EventKind::ChannelClosed,
			LedgerEvent::TokenNetworkCreated { .. } => EventKind::TokenNetworkCreated,
		}
	}
}

/// An event together with where and when it was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
	pub tier: EventTier,
	pub block_number: u64,
	pub log_index: u64,
	/// Contract that emitted the event. For channel events this is the network address.
	pub emitter: Address,
	pub event: LedgerEvent,
}

/// What a ledger event source hands to its consumer, in observation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUpdate {
	Event(EventEnvelope),
	/// Every confirmed event up to and including this block has been delivered.
	BlockConfirmed(u64),
}

/// Errors raised by ledger event sources
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("RPC error {code}: {message}")]
	RpcError { code: i64, message: String },

	#[error("Log decode error: {0}")]
	DecodeError(String),

	#[error("Invalid address in log: {0}")]
	AddressError(#[from] AddressError),

	#[error("Ledger unreachable: {0}")]
	Unreachable(String),

	#[error("Source error: {0}")]
	SourceError(String),
}
