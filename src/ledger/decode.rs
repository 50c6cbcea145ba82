//! Decoding of raw JSON-RPC logs into typed ledger events.

use crate::ledger::types::{EventEnvelope, EventKind, EventTier, LedgerError, LedgerEvent};
use crate::network::{Address, ChannelId, TokenAmount};

use serde::Deserialize;
use sha3::{Digest, Keccak256};

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
	pub address: String,
	pub topics: Vec<String>,
	pub data: String,
	pub block_number: String,
	pub log_index: String,
	#[serde(default)]
	pub removed: bool,
}

pub fn event_topic(kind: EventKind) -> [u8; 32] {
	let digest = Keccak256::digest(kind.signature().as_bytes());
	let mut topic = [0u8; 32];
	topic.copy_from_slice(&digest);
	topic
}

pub fn topic_hex(kind: EventKind) -> String {
	format!("0x{}", hex::encode(event_topic(kind)))
}

pub fn parse_quantity(value: &str) -> Result<u64, LedgerError> {
	let digits = value
		.strip_prefix("0x")
		.ok_or_else(|| LedgerError::DecodeError(format!("quantity '{}' lacks 0x prefix", value)))?;
	u64::from_str_radix(digits, 16)
		.map_err(|e| LedgerError::DecodeError(format!("invalid quantity '{}': {}", value, e)))
}

pub fn format_quantity(value: u64) -> String {
	format!("0x{:x}", value)
}

fn parse_word(value: &str) -> Result<[u8; 32], LedgerError> {
	let digits = value.strip_prefix("0x").unwrap_or(value);
	let mut word = [0u8; 32];
	hex::decode_to_slice(digits, &mut word)
		.map_err(|e| LedgerError::DecodeError(format!("invalid 32-byte word '{}': {}", value, e)))?;
	Ok(word)
}

fn word_to_u64(word: &[u8; 32]) -> Result<u64, LedgerError> {
	if word[..24].iter().any(|b| *b != 0) {
		return Err(LedgerError::DecodeError(
			"value does not fit into 64 bits".to_string(),
		));
	}
	let mut bytes = [0u8; 8];
	bytes.copy_from_slice(&word[24..]);
	Ok(u64::from_be_bytes(bytes))
}

fn word_to_amount(word: &[u8; 32]) -> Result<TokenAmount, LedgerError> {
	if word[..16].iter().any(|b| *b != 0) {
		return Err(LedgerError::DecodeError(
			"amount does not fit into 128 bits".to_string(),
		));
	}
	let mut bytes = [0u8; 16];
	bytes.copy_from_slice(&word[16..]);
	Ok(u128::from_be_bytes(bytes))
}

fn topic(log: &RpcLog, index: usize) -> Result<[u8; 32], LedgerError> {
	let value = log.topics.get(index).ok_or_else(|| {
		LedgerError::DecodeError(format!("log is missing topic {}", index))
	})?;
	parse_word(value)
}

fn data_word(log: &RpcLog, index: usize) -> Result<[u8; 32], LedgerError> {
	let digits = log.data.strip_prefix("0x").unwrap_or(&log.data);
	let start = index * 64;
	let slice = digits.get(start..start + 64).ok_or_else(|| {
		LedgerError::DecodeError(format!("log data is missing word {}", index))
	})?;
	parse_word(slice)
}

fn channel_id(word: &[u8; 32]) -> Result<ChannelId, LedgerError> {
	ChannelId::new(word_to_u64(word)?)
		.map_err(|e| LedgerError::DecodeError(e.to_string()))
}

/// Decode a log into an envelope. Returns `Ok(None)` for logs of other event kinds.
pub fn decode_log(log: &RpcLog, tier: EventTier) -> Result<Option<EventEnvelope>, LedgerError> {
	let signature = topic(log, 0)?;
	let Some(kind) = EventKind::ALL
		.into_iter()
		.find(|kind| event_topic(*kind) == signature)
	else {
		return Ok(None);
	};

	let event = match kind {
		EventKind::ChannelOpened => LedgerEvent::ChannelOpened {
			channel_id: channel_id(&topic(log, 1)?)?,
			participant1: Address::from_word(&topic(log, 2)?)?,
			participant2: Address::from_word(&topic(log, 3)?)?,
		},
		EventKind::ChannelNewDeposit => LedgerEvent::ChannelNewDeposit {
			channel_id: channel_id(&topic(log, 1)?)?,
			participant: Address::from_word(&topic(log, 2)?)?,
			total_deposit: word_to_amount(&data_word(log, 0)?)?,
		},
		EventKind::ChannelClosed => LedgerEvent::ChannelClosed {
			channel_id: channel_id(&topic(log, 1)?)?,
		},
		EventKind::TokenNetworkCreated => LedgerEvent::TokenNetworkCreated {
			network_address: Address::from_word(&topic(log, 2)?)?,
		},
	};

	Ok(Some(EventEnvelope {
		tier,
		block_number: parse_quantity(&log.block_number)?,
		log_index: parse_quantity(&log.log_index)?,
		emitter: log.address.parse()?,
		event,
	}))
}
