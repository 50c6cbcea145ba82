use crate::network::address::Address;
use crate::network::graph::{Channel, ChannelId, ChannelStatus, TokenAmount};

use serde::Serialize;

/// Read-only snapshot of one network, handed to the info/query layer.
///
/// This is an owned copy: events dispatched after it was taken never show up in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkProjection {
	pub network_address: Address,
	pub node_count: usize,
	pub channel_count: usize,
	pub nodes: Vec<Address>,
	pub channels: Vec<ChannelProjection>,
}

impl NetworkProjection {
	/// Channels a router may use. Closed channels are listed but never routable.
	pub fn open_channels(&self) -> impl Iterator<Item = &ChannelProjection> {
		self.channels
			.iter()
			.filter(|channel| channel.status == ChannelStatus::Open)
	}

	pub fn channel(&self, channel_id: ChannelId) -> Option<&ChannelProjection> {
		self.channels
			.iter()
			.find(|channel| channel.channel_id == channel_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelProjection {
	pub channel_id: ChannelId,
	pub status: ChannelStatus,
	pub participant1: Address,
	pub participant2: Address,
	pub deposit1: TokenAmount,
	pub deposit2: TokenAmount,
	pub capacity1: TokenAmount,
	pub capacity2: TokenAmount,
}

impl From<&Channel> for ChannelProjection {
	fn from(channel: &Channel) -> Self {
		Self {
			channel_id: channel.id,
			status: channel.status,
			participant1: channel.participant1,
			participant2: channel.participant2,
			deposit1: channel.view1.deposit,
			deposit2: channel.view2.deposit,
			capacity1: channel.view1.capacity(),
			capacity2: channel.view2.capacity(),
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::network::address::Address;
	use crate::network::graph::{ChannelGraph, ChannelId, ChannelStatus};

	#[test]
	fn test_projection_fields() {
		let network = Address::from_bytes([0xee; 20]);
		let p1 = Address::from_bytes([1; 20]);
		let p2 = Address::from_bytes([2; 20]);
		let p3 = Address::from_bytes([3; 20]);

		let mut graph = ChannelGraph::new(network);
		let first = ChannelId::new(1).unwrap();
		let second = ChannelId::new(2).unwrap();
		graph.handle_channel_opened(first, p1, p2).unwrap();
		graph.handle_channel_opened(second, p2, p3).unwrap();
		graph.handle_channel_new_deposit(first, p2, 70).unwrap();
		graph.handle_channel_closed(second).unwrap();

		let projection = graph.project();
		assert_eq!(projection.network_address, network);
		assert_eq!(projection.node_count, 3);
		assert_eq!(projection.nodes, vec![p1, p2, p3]);
		assert_eq!(projection.channel_count, 2);

		let channel = projection.channel(first).unwrap();
		assert_eq!(channel.deposit1, 0);
		assert_eq!(channel.deposit2, 70);
		assert_eq!(channel.capacity2, 70);
		assert_eq!(
			projection.channel(second).unwrap().status,
			ChannelStatus::Closed
		);

		let open: Vec<_> = projection.open_channels().map(|c| c.channel_id).collect();
		assert_eq!(open, vec![first]);
	}

	#[test]
	fn test_projection_serializes_status_and_addresses() {
		let network = Address::from_bytes([0xaa; 20]);
		let mut graph = ChannelGraph::new(network);
		graph
			.handle_channel_opened(
				ChannelId::new(4).unwrap(),
				Address::from_bytes([1; 20]),
				Address::from_bytes([2; 20]),
			)
			.unwrap();

		let json = serde_json::to_value(graph.project()).unwrap();
		assert_eq!(
			json["network_address"],
			"0xaAaAaAaaAaAaAaaAaAAAAAAAAaaaAaAaAaaAaaAa"
		);
		assert_eq!(json["channels"][0]["status"], "open");
		assert_eq!(json["channels"][0]["channel_id"], 4);
	}
}
