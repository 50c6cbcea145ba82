//! Versioned on-disk checkpoint schema.
//!
//! A checkpoint is a JSON document with a header (`version`, `network_address`,
//! `confirmed_height`, `created_at`) and the full channel list with both participant views.
//! Every field is required. Documents carrying another `version` are rejected before their body
//! is interpreted.

use crate::checkpoint::types::CheckpointError;
use crate::network::{
	Address, Channel, ChannelGraph, ChannelId, ChannelStatus, ParticipantView, TokenAmount,
};

use serde::{Deserialize, Serialize};

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
	pub version: u32,
	pub network_address: Address,
	pub confirmed_height: u64,
	/// RFC 3339 creation time, informational only.
	pub created_at: String,
	pub channels: Vec<ChannelRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
	pub channel_id: u64,
	pub status: ChannelStatus,
	pub participant1: Address,
	pub participant2: Address,
	pub view1: ViewRecord,
	pub view2: ViewRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
	pub deposit: TokenAmount,
	pub withdrawn: TokenAmount,
}

#[derive(Deserialize)]
struct VersionProbe {
	version: Option<u32>,
}

impl From<&ParticipantView> for ViewRecord {
	fn from(view: &ParticipantView) -> Self {
		Self {
			deposit: view.deposit,
			withdrawn: view.withdrawn,
		}
	}
}

impl From<ViewRecord> for ParticipantView {
	fn from(record: ViewRecord) -> Self {
		Self {
			deposit: record.deposit,
			withdrawn: record.withdrawn,
		}
	}
}

impl From<&Channel> for ChannelRecord {
	fn from(channel: &Channel) -> Self {
		Self {
			channel_id: channel.id.get(),
			status: channel.status,
			participant1: channel.participant1,
			participant2: channel.participant2,
			view1: ViewRecord::from(&channel.view1),
			view2: ViewRecord::from(&channel.view2),
		}
	}
}

impl CheckpointRecord {
	/// Copy the graph into a record. The copy is taken synchronously, so it reflects exactly the
	/// events applied before this call.
	pub fn capture(graph: &ChannelGraph, confirmed_height: u64) -> Self {
		Self {
			version: CHECKPOINT_VERSION,
			network_address: graph.address(),
			confirmed_height,
			created_at: chrono::Utc::now().to_rfc3339(),
			channels: graph.channels().into_iter().map(ChannelRecord::from).collect(),
		}
	}

	pub fn encode(&self) -> Result<Vec<u8>, CheckpointError> {
		serde_json::to_vec_pretty(self).map_err(|e| {
			CheckpointError::EncodeError(format!("Failed to serialize checkpoint: {}", e))
		})
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, CheckpointError> {
		let probe: VersionProbe = serde_json::from_slice(bytes).map_err(|e| {
			CheckpointError::InvalidCheckpoint(format!("not a checkpoint document: {}", e))
		})?;

		match probe.version {
			None => {
				return Err(CheckpointError::InvalidCheckpoint(
					"missing field `version`".to_string(),
				));
			}
			Some(found) if found != CHECKPOINT_VERSION => {
				return Err(CheckpointError::UnsupportedVersion {
					found,
					expected: CHECKPOINT_VERSION,
				});
			}
			Some(_) => {}
		}

		serde_json::from_slice(bytes)
			.map_err(|e| CheckpointError::InvalidCheckpoint(e.to_string()))
	}

	/// Same network state, ignoring the creation time.
	pub fn same_state(&self, other: &Self) -> bool {
		self.version == other.version
			&& self.network_address == other.network_address
			&& self.confirmed_height == other.confirmed_height
			&& self.channels == other.channels
	}

	/// Rebuild the graph, enforcing the graph invariants on the stored channels.
	pub fn into_graph(self) -> Result<ChannelGraph, CheckpointError> {
		let channels = self
			.channels
			.into_iter()
			.map(|record| {
				let id = ChannelId::new(record.channel_id)
					.map_err(|e| CheckpointError::InvalidCheckpoint(e.to_string()))?;
				Ok(Channel {
					id,
					participant1: record.participant1,
					participant2: record.participant2,
					view1: record.view1.into(),
					view2: record.view2.into(),
					status: record.status,
				})
			})
			.collect::<Result<Vec<_>, CheckpointError>>()?;

		ChannelGraph::from_channels(self.network_address, channels)
			.map_err(|e| CheckpointError::InvalidCheckpoint(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr(byte: u8) -> Address {
		Address::from_bytes([byte; 20])
	}

	fn sample_graph() -> ChannelGraph {
		let mut graph = ChannelGraph::new(addr(0xee));
		let first = ChannelId::new(1).unwrap();
		let second = ChannelId::new(2).unwrap();
		graph.handle_channel_opened(first, addr(1), addr(2)).unwrap();
		graph.handle_channel_opened(second, addr(2), addr(3)).unwrap();
		graph.handle_channel_new_deposit(first, addr(1), u128::from(u64::MAX) + 7).unwrap();
		graph.handle_channel_closed(second).unwrap();
		graph
	}

	#[test]
	fn test_encode_decode_preserves_graph() {
		let graph = sample_graph();
		let record = CheckpointRecord::capture(&graph, 500);
		let decoded = CheckpointRecord::decode(&record.encode().unwrap()).unwrap();
		assert!(decoded.same_state(&record));

		let restored = decoded.into_graph().unwrap();
		assert_eq!(restored.project(), graph.project());
	}

	#[test]
	fn test_missing_field_is_invalid() {
		let document = serde_json::json!({
			"version": 1,
			"network_address": addr(0xee).to_string(),
			"confirmed_height": 10,
			"created_at": "2024-01-01T00:00:00Z",
			"channels": [{
				"channel_id": 1,
				"status": "open",
				"participant1": addr(1).to_string(),
				"participant2": addr(2).to_string(),
				"view1": { "deposit": 5, "withdrawn": 0 }
			}]
		});
		let bytes = serde_json::to_vec(&document).unwrap();
		assert!(matches!(
			CheckpointRecord::decode(&bytes),
			Err(CheckpointError::InvalidCheckpoint(_))
		));
	}

	#[test]
	fn test_version_is_checked_first() {
		let missing = br#"{"channels": []}"#;
		assert!(matches!(
			CheckpointRecord::decode(missing),
			Err(CheckpointError::InvalidCheckpoint(_))
		));

		let newer = br#"{"version": 2, "something": "else"}"#;
		assert!(matches!(
			CheckpointRecord::decode(newer),
			Err(CheckpointError::UnsupportedVersion {
				found: 2,
				expected: 1
			})
		));

		assert!(CheckpointRecord::decode(b"\x80\x04pickle").unwrap_err().is_invalid());
	}

	#[test]
	fn test_into_graph_rejects_broken_invariants() {
		let mut record = CheckpointRecord::capture(&sample_graph(), 500);
		record.channels[1].participant2 = record.channels[1].participant1;
		assert!(matches!(
			record.into_graph(),
			Err(CheckpointError::InvalidCheckpoint(_))
		));

		let mut record = CheckpointRecord::capture(&sample_graph(), 500);
		record.channels[0].channel_id = 0;
		assert!(record.into_graph().is_err());

		let mut record = CheckpointRecord::capture(&sample_graph(), 500);
		record.channels[1].channel_id = 1;
		assert!(record.into_graph().is_err());
	}
}
