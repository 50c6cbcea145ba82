//! Event handling for the sync loop.
//!
//! Handlers are registered per (event kind, tier) on an `EventDispatcher`, and the registered pairs
//! are exactly what the orchestrator subscribes to on the ledger event source. Handlers are plain
//! synchronous functions of the registry, so applying one event never suspends halfway.
//!
//! Only confirmed events mutate state. Tentative events are observed for progress reporting.

use crate::ledger::{EventEnvelope, EventKind, EventTier, LedgerEvent};
use crate::network::{ApplyOutcome, FollowPolicy, GraphError, NetworkRegistry};
use crate::sync::types::SyncError;

use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// What handling one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
	/// State changed.
	Applied,
	/// Already reflected in state.
	Unchanged,
	/// Intentionally not applied: covered by a checkpoint, or tentative.
	Skipped,
	/// Malformed, or addressed to a network that is not followed.
	Dropped,
}

impl From<ApplyOutcome> for HandleOutcome {
	fn from(outcome: ApplyOutcome) -> Self {
		match outcome {
			ApplyOutcome::Applied => HandleOutcome::Applied,
			ApplyOutcome::Unchanged => HandleOutcome::Unchanged,
		}
	}
}

/// Trait for handling ledger events.
///
/// Bad input is absorbed by the handler (logged, reported as `Dropped`). An `Err` means the
/// registry can no longer be trusted and ends the sync loop.
pub trait LedgerEventHandler: Send + Sync {
	fn handle(
		&self,
		envelope: &EventEnvelope,
		registry: &mut NetworkRegistry,
	) -> Result<HandleOutcome, GraphError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Routes each event to the handler registered for its kind and tier.
pub struct EventDispatcher {
	handlers: BTreeMap<(EventKind, EventTier), Box<dyn LedgerEventHandler>>,
}

impl Default for EventDispatcher {
	fn default() -> Self {
		Self::new()
	}
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self {
			handlers: BTreeMap::new(),
		}
	}

	/// Handlers for a follow policy: channel events always, network creation only when following
	/// a registry.
	pub fn for_policy(policy: &FollowPolicy) -> Self {
		let mut dispatcher = Self::new();
		for kind in [
			EventKind::ChannelOpened,
			EventKind::ChannelNewDeposit,
			EventKind::ChannelClosed,
		] {
			dispatcher.register_handler(kind, EventTier::Confirmed, Box::new(ChannelEventHandler));
			dispatcher.register_handler(kind, EventTier::Tentative, Box::new(TentativeEventObserver));
		}
		if let FollowPolicy::Registry(_) = policy {
			dispatcher.register_handler(
				EventKind::TokenNetworkCreated,
				EventTier::Confirmed,
				Box::new(NetworkCreatedHandler),
			);
			dispatcher.register_handler(
				EventKind::TokenNetworkCreated,
				EventTier::Tentative,
				Box::new(TentativeEventObserver),
			);
		}
		dispatcher
	}

	/// Register the handler for `(kind, tier)`, replacing any previous one.
	pub fn register_handler(
		&mut self,
		kind: EventKind,
		tier: EventTier,
		handler: Box<dyn LedgerEventHandler>,
	) {
		if let Some(previous) = self.handlers.insert((kind, tier), handler) {
			debug!("Replaced {} handler {} for {}", tier, previous.name(), kind);
		}
	}

	/// The (kind, tier) pairs that have a handler.
	pub fn subscriptions(&self) -> Vec<(EventKind, EventTier)> {
		self.handlers.keys().copied().collect()
	}

	pub fn dispatch(
		&self,
		envelope: &EventEnvelope,
		registry: &mut NetworkRegistry,
	) -> Result<HandleOutcome, SyncError> {
		let kind = envelope.event.kind();
		let Some(handler) = self.handlers.get(&(kind, envelope.tier)) else {
			debug!("No handler for {} {} event", envelope.tier, kind);
			return Ok(HandleOutcome::Skipped);
		};

		handler.handle(envelope, registry).map_err(|source| {
			error!(
				"Handler {} failed on {} {} event at block {} (log {}) from {}: {}",
				handler.name(),
				envelope.tier,
				kind,
				envelope.block_number,
				envelope.log_index,
				envelope.emitter,
				source
			);
			SyncError::DispatchError {
				kind,
				block_number: envelope.block_number,
				source,
			}
		})
	}
}

/// Applies confirmed channel events to the graph of the emitting network.
pub struct ChannelEventHandler;

impl LedgerEventHandler for ChannelEventHandler {
	fn handle(
		&self,
		envelope: &EventEnvelope,
		registry: &mut NetworkRegistry,
	) -> Result<HandleOutcome, GraphError> {
		let Some(network) = registry.lookup_mut(&envelope.emitter) else {
			info!(
				"Ignoring {} event from unknown network {}",
				envelope.event.kind(),
				envelope.emitter
			);
			return Ok(HandleOutcome::Dropped);
		};

		if network.covers_block(envelope.block_number) {
			debug!(
				"Skipping {} event at block {} for {}, already in checkpoint",
				envelope.event.kind(),
				envelope.block_number,
				envelope.emitter
			);
			return Ok(HandleOutcome::Skipped);
		}

		let result = match &envelope.event {
			LedgerEvent::ChannelOpened {
				channel_id,
				participant1,
				participant2,
			} => {
				debug!("Received ChannelOpened event for network {}", envelope.emitter);
				network
					.graph
					.handle_channel_opened(*channel_id, *participant1, *participant2)
			}
			LedgerEvent::ChannelNewDeposit {
				channel_id,
				participant,
				total_deposit,
			} => {
				debug!("Received ChannelNewDeposit event for network {}", envelope.emitter);
				network
					.graph
					.handle_channel_new_deposit(*channel_id, *participant, *total_deposit)
			}
			LedgerEvent::ChannelClosed { channel_id } => {
				debug!("Received ChannelClosed event for network {}", envelope.emitter);
				network.graph.handle_channel_closed(*channel_id)
			}
			LedgerEvent::TokenNetworkCreated { .. } => {
				warn!("TokenNetworkCreated routed to the channel handler, ignoring");
				return Ok(HandleOutcome::Dropped);
			}
		};

		if !matches!(&result, Err(e) if e.is_fatal()) {
			network.advance_to(envelope.block_number);
		}
		match result {
			Ok(outcome) => Ok(outcome.into()),
			Err(e) if e.is_fatal() => Err(e),
			Err(e) => {
				warn!(
					"Dropping {} event at block {} for network {}: {}",
					envelope.event.kind(),
					envelope.block_number,
					envelope.emitter,
					e
				);
				Ok(HandleOutcome::Dropped)
			}
		}
	}

	fn name(&self) -> &'static str {
		"ChannelEventHandler"
	}
}

/// Starts following networks announced by the registry.
pub struct NetworkCreatedHandler;

impl LedgerEventHandler for NetworkCreatedHandler {
	fn handle(
		&self,
		envelope: &EventEnvelope,
		registry: &mut NetworkRegistry,
	) -> Result<HandleOutcome, GraphError> {
		let LedgerEvent::TokenNetworkCreated { network_address } = &envelope.event else {
			return Ok(HandleOutcome::Dropped);
		};

		if registry.contains(network_address) {
			return Ok(HandleOutcome::Unchanged);
		}
		info!("Found new network at {}", network_address);
		registry.get_or_create(*network_address);
		Ok(HandleOutcome::Applied)
	}

	fn name(&self) -> &'static str {
		"NetworkCreatedHandler"
	}
}

/// Observes tentative events without touching state.
pub struct TentativeEventObserver;

impl LedgerEventHandler for TentativeEventObserver {
	fn handle(
		&self,
		envelope: &EventEnvelope,
		_registry: &mut NetworkRegistry,
	) -> Result<HandleOutcome, GraphError> {
		debug!(
			"Tentative {} event at block {} from {}",
			envelope.event.kind(),
			envelope.block_number,
			envelope.emitter
		);
		Ok(HandleOutcome::Skipped)
	}

	fn name(&self) -> &'static str {
		"TentativeEventObserver"
	}
}
