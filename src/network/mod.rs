//! Channel network model.
//!
//! Addresses, the per-network channel graph with its event handlers, read-only projections for the
//! query layer, and the registry that owns one graph per followed network.

/// Checksummed 20-byte account addresses
pub mod address;
/// Per-network channel graph and event application
pub mod graph;
/// Read-only snapshots of a network
pub mod projection;
/// Followed networks and their bootstrap policy
pub mod registry;

pub use address::{Address, AddressError};
pub use graph::{
	ApplyOutcome, Channel, ChannelGraph, ChannelId, ChannelStatus, GraphError, ParticipantView,
	TokenAmount,
};
pub use projection::{ChannelProjection, NetworkProjection};
pub use registry::{FollowPolicy, Network, NetworkRegistry};
