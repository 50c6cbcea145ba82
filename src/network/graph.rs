//! Channel graph for a single network.
//!
//! The graph is undirected: nodes are participant addresses and every edge is one channel carrying
//! both participants' views. Deposit and close events only name the channel id, so a reverse index
//! from `ChannelId` to the edge resolves them without scanning the graph.
//!
//! Every event handler recomputes the touched state from the event payload alone, which makes
//! re-delivery of an already applied event harmless.

use crate::network::address::Address;
use crate::network::projection::{ChannelProjection, NetworkProjection};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Token amounts are unsigned integers in the token's smallest unit.
pub type TokenAmount = u128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
	#[error("channel identifier 0 is not a valid channel")]
	InvalidChannelId,

	#[error("channel {channel_id} would connect {participant} with itself")]
	SelfLoop {
		channel_id: ChannelId,
		participant: Address,
	},

	#[error("unknown channel {0}")]
	UnknownChannel(ChannelId),

	#[error("{participant} is not a participant of channel {channel_id}")]
	ParticipantNotInChannel {
		channel_id: ChannelId,
		participant: Address,
	},

	#[error("channel {0} appears more than once")]
	DuplicateChannel(ChannelId),

	#[error("reverse index entry for channel {0} does not resolve to an edge")]
	IndexCorrupted(ChannelId),
}

impl GraphError {
	/// Whether the graph itself can no longer be trusted.
	///
	/// Everything else describes a bad event and only costs that event.
	pub fn is_fatal(&self) -> bool {
		matches!(self, GraphError::IndexCorrupted(_))
	}
}

/// Network-scoped channel identifier. Valid identifiers start at 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
	pub fn new(raw: u64) -> Result<Self, GraphError> {
		if raw == 0 {
			return Err(GraphError::InvalidChannelId);
		}
		Ok(Self(raw))
	}

	pub fn get(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Debug for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ChannelId({})", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
	Open,
	Closed,
}

/// One participant's side of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantView {
	/// Total deposit as of the latest deposit event (absolute, not cumulative).
	pub deposit: TokenAmount,
	/// Reserved, no withdraw events are tracked yet.
	pub withdrawn: TokenAmount,
}

impl ParticipantView {
	pub fn capacity(&self) -> TokenAmount {
		self.deposit.saturating_sub(self.withdrawn)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
	pub id: ChannelId,
	pub participant1: Address,
	pub participant2: Address,
	pub view1: ParticipantView,
	pub view2: ParticipantView,
	pub status: ChannelStatus,
}

impl Channel {
	/// A freshly opened channel with zero-valued views.
	pub fn new(
		id: ChannelId,
		participant1: Address,
		participant2: Address,
	) -> Result<Self, GraphError> {
		if participant1 == participant2 {
			return Err(GraphError::SelfLoop {
				channel_id: id,
				participant: participant1,
			});
		}

		Ok(Self {
			id,
			participant1,
			participant2,
			view1: ParticipantView::default(),
			view2: ParticipantView::default(),
			status: ChannelStatus::Open,
		})
	}

	pub fn is_open(&self) -> bool {
		self.status == ChannelStatus::Open
	}

	pub fn view(&self, participant: &Address) -> Option<&ParticipantView> {
		if *participant == self.participant1 {
			Some(&self.view1)
		} else if *participant == self.participant2 {
			Some(&self.view2)
		} else {
			None
		}
	}

	fn view_mut(&mut self, participant: &Address) -> Option<&mut ParticipantView> {
		if *participant == self.participant1 {
			Some(&mut self.view1)
		} else if *participant == self.participant2 {
			Some(&mut self.view2)
		} else {
			None
		}
	}

	fn same_endpoints(&self, participant1: &Address, participant2: &Address) -> bool {
		(self.participant1 == *participant1 && self.participant2 == *participant2)
			|| (self.participant1 == *participant2 && self.participant2 == *participant1)
	}
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	/// The graph changed.
	Applied,
	/// The event was already reflected (re-delivery, stale value, repeated close).
	Unchanged,
}

/// Authoritative channel graph of one network.
#[derive(Debug, Clone)]
pub struct ChannelGraph {
	address: Address,
	graph: StableUnGraph<Address, Channel>,
	nodes: HashMap<Address, NodeIndex>,
	channel_index: HashMap<ChannelId, EdgeIndex>,
}

impl ChannelGraph {
	pub fn new(address: Address) -> Self {
		Self {
			address,
			graph: StableUnGraph::default(),
			nodes: HashMap::new(),
			channel_index: HashMap::new(),
		}
	}

	/// Rebuild a graph from persisted channels, rejecting duplicates and self loops.
	pub fn from_channels(
		address: Address,
		channels: impl IntoIterator<Item = Channel>,
	) -> Result<Self, GraphError> {
		let mut graph = Self::new(address);
		for channel in channels {
			if channel.participant1 == channel.participant2 {
				return Err(GraphError::SelfLoop {
					channel_id: channel.id,
					participant: channel.participant1,
				});
			}
			if graph.channel_index.contains_key(&channel.id) {
				return Err(GraphError::DuplicateChannel(channel.id));
			}
			graph.insert_channel(channel);
		}
		Ok(graph)
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	pub fn channel_count(&self) -> usize {
		self.channel_index.len()
	}

	/// ChannelOpened: add the edge with two zero-valued views.
	///
	/// An id that is already known is a re-delivery and leaves the graph untouched.
	pub fn handle_channel_opened(
		&mut self,
		channel_id: ChannelId,
		participant1: Address,
		participant2: Address,
	) -> Result<ApplyOutcome, GraphError> {
		if let Some(existing) = self.channel(channel_id) {
			if !existing.same_endpoints(&participant1, &participant2) {
				warn!(
					"ChannelOpened for channel {} with participants {}/{} conflicts with known participants {}/{}, ignoring",
					channel_id,
					participant1,
					participant2,
					existing.participant1,
					existing.participant2
				);
			} else {
				debug!("Channel {} already known, ignoring re-delivery", channel_id);
			}
			return Ok(ApplyOutcome::Unchanged);
		}

		let channel = Channel::new(channel_id, participant1, participant2)?;
		self.insert_channel(channel);
		Ok(ApplyOutcome::Applied)
	}

	/// ChannelNewDeposit: overwrite the participant's deposit with the new total.
	///
	/// A total below the last known deposit can only come from a stale re-delivery and is ignored.
	pub fn handle_channel_new_deposit(
		&mut self,
		channel_id: ChannelId,
		participant: Address,
		total_deposit: TokenAmount,
	) -> Result<ApplyOutcome, GraphError> {
		let edge = self.edge_for(channel_id)?;
		let channel = self
			.graph
			.edge_weight_mut(edge)
			.ok_or(GraphError::IndexCorrupted(channel_id))?;

		let view = channel
			.view_mut(&participant)
			.ok_or(GraphError::ParticipantNotInChannel {
				channel_id,
				participant,
			})?;

		if total_deposit < view.deposit {
			warn!(
				"Ignoring stale deposit {} for {} in channel {} (current {})",
				total_deposit, participant, channel_id, view.deposit
			);
			return Ok(ApplyOutcome::Unchanged);
		}
		if total_deposit == view.deposit {
			return Ok(ApplyOutcome::Unchanged);
		}

		view.deposit = total_deposit;
		Ok(ApplyOutcome::Applied)
	}

	/// ChannelClosed: mark the channel closed. Closed channels stay in the graph.
	pub fn handle_channel_closed(
		&mut self,
		channel_id: ChannelId,
	) -> Result<ApplyOutcome, GraphError> {
		let edge = self.edge_for(channel_id)?;
		let channel = self
			.graph
			.edge_weight_mut(edge)
			.ok_or(GraphError::IndexCorrupted(channel_id))?;

		if channel.status == ChannelStatus::Closed {
			return Ok(ApplyOutcome::Unchanged);
		}
		channel.status = ChannelStatus::Closed;
		Ok(ApplyOutcome::Applied)
	}

	pub fn channel(&self, channel_id: ChannelId) -> Option<&Channel> {
		self.channel_index
			.get(&channel_id)
			.and_then(|edge| self.graph.edge_weight(*edge))
	}

	/// Capacity `participant` can currently send through the channel.
	pub fn capacity(&self, channel_id: ChannelId, participant: &Address) -> Option<TokenAmount> {
		self.channel(channel_id)
			.and_then(|channel| channel.view(participant))
			.map(ParticipantView::capacity)
	}

	/// All channels ordered by identifier.
	pub fn channels(&self) -> Vec<&Channel> {
		let mut channels: Vec<&Channel> = self
			.channel_index
			.values()
			.filter_map(|edge| self.graph.edge_weight(*edge))
			.collect();
		channels.sort_by_key(|channel| channel.id);
		channels
	}

	/// Participants reachable from `participant` over a single open channel.
	pub fn neighbors(&self, participant: &Address) -> Vec<Address> {
		let Some(node) = self.nodes.get(participant) else {
			return Vec::new();
		};

		let neighbors: BTreeSet<Address> = self
			.graph
			.edges(*node)
			.filter(|edge| edge.weight().is_open())
			.filter_map(|edge| {
				let other = if edge.source() == *node {
					edge.target()
				} else {
					edge.source()
				};
				self.graph.node_weight(other).copied()
			})
			.collect();
		neighbors.into_iter().collect()
	}

	/// Point-in-time copy of the graph for readers outside the dispatch path.
	pub fn project(&self) -> NetworkProjection {
		let nodes: BTreeSet<Address> = self.nodes.keys().copied().collect();
		let channels: Vec<ChannelProjection> = self
			.channels()
			.into_iter()
			.map(ChannelProjection::from)
			.collect();

		NetworkProjection {
			network_address: self.address,
			node_count: nodes.len(),
			channel_count: channels.len(),
			nodes: nodes.into_iter().collect(),
			channels,
		}
	}

	fn edge_for(&self, channel_id: ChannelId) -> Result<EdgeIndex, GraphError> {
		self.channel_index
			.get(&channel_id)
			.copied()
			.ok_or(GraphError::UnknownChannel(channel_id))
	}

	fn node_for(&mut self, participant: Address) -> NodeIndex {
		if let Some(node) = self.nodes.get(&participant) {
			return *node;
		}
		let node = self.graph.add_node(participant);
		self.nodes.insert(participant, node);
		node
	}

	fn insert_channel(&mut self, channel: Channel) {
		let node1 = self.node_for(channel.participant1);
		let node2 = self.node_for(channel.participant2);
		let channel_id = channel.id;
		let edge = self.graph.add_edge(node1, node2, channel);
		self.channel_index.insert(channel_id, edge);
	}
}
