//! Registry of followed networks.
//!
//! The registry owns every `ChannelGraph` and decides when a network comes into existence: either
//! eagerly from a static follow-list, or lazily when the network registry contract announces it.
//! Networks are never removed while the service runs.

use crate::network::address::Address;
use crate::network::graph::ChannelGraph;
use crate::network::projection::NetworkProjection;

use std::collections::BTreeMap;
use tracing::info;

/// How the set of followed networks is determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowPolicy {
	/// Follow exactly these networks, ignore network creation events.
	Static(Vec<Address>),
	/// Follow every network announced by this registry contract.
	Registry(Address),
}

/// A followed network and the heights its state is known to cover.
#[derive(Debug, Clone)]
pub struct Network {
	pub graph: ChannelGraph,
	/// Confirmed height of the checkpoint this network was restored from.
	pub checkpoint_height: Option<u64>,
	/// Highest confirmed block whose events are reflected in `graph`.
	pub synced_height: u64,
}

impl Network {
	fn new(address: Address) -> Self {
		Self {
			graph: ChannelGraph::new(address),
			checkpoint_height: None,
			synced_height: 0,
		}
	}

	pub fn address(&self) -> Address {
		self.graph.address()
	}

	/// Record that the confirmed events of `block_number` have been applied to `graph`.
	pub fn advance_to(&mut self, block_number: u64) {
		self.synced_height = self.synced_height.max(block_number);
	}

	/// Events at or below the checkpoint height are already part of the restored graph.
	pub fn covers_block(&self, block_number: u64) -> bool {
		self.checkpoint_height
			.is_some_and(|height| block_number <= height)
	}
}

#[derive(Debug, Default)]
pub struct NetworkRegistry {
	networks: BTreeMap<Address, Network>,
}

impl NetworkRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build the registry for a policy; a static follow-list is materialized up front.
	pub fn bootstrap(policy: &FollowPolicy) -> Self {
		let mut registry = Self::new();
		match policy {
			FollowPolicy::Static(addresses) => {
				for address in addresses {
					registry.get_or_create(*address);
				}
			}
			FollowPolicy::Registry(registry_address) => {
				info!(
					"Following all networks announced by registry {}",
					registry_address
				);
			}
		}
		registry
	}

	/// Return the network for `address`, creating an empty one on first use.
	pub fn get_or_create(&mut self, address: Address) -> &mut Network {
		self.networks.entry(address).or_insert_with(|| {
			info!("Following network at {}", address);
			Network::new(address)
		})
	}

	/// Unknown networks are routine, the caller logs and drops the event.
	pub fn lookup(&self, address: &Address) -> Option<&Network> {
		self.networks.get(address)
	}

	pub fn lookup_mut(&mut self, address: &Address) -> Option<&mut Network> {
		self.networks.get_mut(address)
	}

	/// Replace a network's graph with one restored from a checkpoint.
	pub fn restore(&mut self, graph: ChannelGraph, checkpoint_height: u64) {
		let network = self.get_or_create(graph.address());
		network.graph = graph;
		network.checkpoint_height = Some(checkpoint_height);
		network.synced_height = network.synced_height.max(checkpoint_height);
	}

	/// Record that all events up to `height` have been delivered.
	pub fn advance_synced_height(&mut self, height: u64) {
		for network in self.networks.values_mut() {
			network.advance_to(height);
		}
	}

	pub fn contains(&self, address: &Address) -> bool {
		self.networks.contains_key(address)
	}

	pub fn len(&self) -> usize {
		self.networks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.networks.is_empty()
	}

	pub fn addresses(&self) -> Vec<Address> {
		self.networks.keys().copied().collect()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Network> {
		self.networks.values()
	}

	pub fn project(&self, address: &Address) -> Option<NetworkProjection> {
		self.lookup(address).map(|network| network.graph.project())
	}

	pub fn projections(&self) -> Vec<NetworkProjection> {
		self.iter().map(|network| network.graph.project()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::network::graph::ChannelId;

	fn addr(byte: u8) -> Address {
		Address::from_bytes([byte; 20])
	}

	#[test]
	fn test_get_or_create_is_idempotent() {
		let mut registry = NetworkRegistry::new();
		registry
			.get_or_create(addr(1))
			.graph
			.handle_channel_opened(ChannelId::new(1).unwrap(), addr(2), addr(3))
			.unwrap();

		let network = registry.get_or_create(addr(1));
		assert_eq!(network.graph.channel_count(), 1);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn test_lookup_unknown_network() {
		let registry = NetworkRegistry::bootstrap(&FollowPolicy::Static(vec![addr(1)]));
		assert!(registry.lookup(&addr(1)).is_some());
		assert!(registry.lookup(&addr(2)).is_none());
	}

	#[test]
	fn test_registry_policy_starts_empty() {
		let registry = NetworkRegistry::bootstrap(&FollowPolicy::Registry(addr(9)));
		assert!(registry.is_empty());
	}

	#[test]
	fn test_restore_sets_heights() {
		let mut registry = NetworkRegistry::bootstrap(&FollowPolicy::Static(vec![addr(1)]));
		registry.restore(ChannelGraph::new(addr(1)), 500);
		registry.advance_synced_height(300);

		let network = registry.lookup(&addr(1)).unwrap();
		assert_eq!(network.checkpoint_height, Some(500));
		assert_eq!(network.synced_height, 500);
		assert!(network.covers_block(500));
		assert!(!network.covers_block(501));

		registry.advance_synced_height(800);
		assert_eq!(registry.lookup(&addr(1)).unwrap().synced_height, 800);
	}

	#[test]
	fn test_applied_block_advances_one_network() {
		let mut registry = NetworkRegistry::bootstrap(&FollowPolicy::Static(vec![addr(1), addr(2)]));
		registry.advance_synced_height(500);
		registry.lookup_mut(&addr(1)).unwrap().advance_to(505);
		registry.lookup_mut(&addr(1)).unwrap().advance_to(502);

		assert_eq!(registry.lookup(&addr(1)).unwrap().synced_height, 505);
		assert_eq!(registry.lookup(&addr(2)).unwrap().synced_height, 500);
	}
}
