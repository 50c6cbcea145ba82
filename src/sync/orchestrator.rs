//! Channel state sync orchestrator.
//!
//! `SyncOrchestrator` owns the network registry, the checkpoint store and the ledger event source,
//! and drives the service lifecycle:
//!
//! - startup: restore checkpoints, compute the resume height, subscribe and start the source
//! - run: apply updates from the source on a single control loop until stopped
//! - shutdown: stop the source, then save a final checkpoint per network
//!
//! All graph mutation happens on the control loop. Checkpoints are captured synchronously from the
//! live graphs, so a saved checkpoint always reflects a whole number of applied events.

use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::config::ServiceConfig;
use crate::ledger::{LedgerEventSource, SourceUpdate};
use crate::network::{Address, FollowPolicy, NetworkProjection, NetworkRegistry};
use crate::sync::events::EventDispatcher;
use crate::sync::progress_tracker::{SyncProgressTracker, SyncStats};
use crate::sync::types::SyncError;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

const UPDATE_BUFFER: usize = 1024;

/// Requests the orchestrator to stop. Cloneable; stopping twice is a no-op.
#[derive(Clone)]
pub struct StopHandle {
	stop_tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
	pub fn stop(&self) {
		if !self.stop_tx.send_replace(true) {
			info!("Stop requested");
		}
	}

	pub fn is_stopped(&self) -> bool {
		*self.stop_tx.borrow()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	Created,
	Running,
	Stopped,
}

pub struct SyncOrchestrator {
	config: ServiceConfig,
	policy: FollowPolicy,
	registry: NetworkRegistry,
	store: CheckpointStore,
	source: Box<dyn LedgerEventSource>,
	dispatcher: EventDispatcher,
	tracker: SyncProgressTracker,
	updates: Option<mpsc::Receiver<SourceUpdate>>,
	stop_tx: Arc<watch::Sender<bool>>,
	last_autosave_height: u64,
	lifecycle: Lifecycle,
}

impl SyncOrchestrator {
	/// Create an orchestrator that checkpoints into `config.data_dir`.
	pub fn new(config: ServiceConfig, source: Box<dyn LedgerEventSource>) -> Result<Self, SyncError> {
		let store = CheckpointStore::new(config.data_dir.clone());
		Self::with_store(config, source, store)
	}

	pub fn with_store(
		config: ServiceConfig,
		source: Box<dyn LedgerEventSource>,
		store: CheckpointStore,
	) -> Result<Self, SyncError> {
		config.validate()?;
		let policy = config.follow_policy()?;
		let registry = NetworkRegistry::bootstrap(&policy);
		let dispatcher = EventDispatcher::for_policy(&policy);
		let (stop_tx, _) = watch::channel(false);

		Ok(Self {
			tracker: SyncProgressTracker::new(config.default_start_height),
			last_autosave_height: config.default_start_height,
			config,
			policy,
			registry,
			store,
			source,
			dispatcher,
			updates: None,
			stop_tx: Arc::new(stop_tx),
			lifecycle: Lifecycle::Created,
		})
	}

	pub fn stop_handle(&self) -> StopHandle {
		StopHandle {
			stop_tx: self.stop_tx.clone(),
		}
	}

	pub fn registry(&self) -> &NetworkRegistry {
		&self.registry
	}

	/// Point-in-time projection of one network.
	pub fn project(&self, network: &Address) -> Option<NetworkProjection> {
		self.registry.project(network)
	}

	pub fn progress(&self) -> SyncStats {
		self.tracker.get_stats()
	}

	/// Restore checkpoints and start the event source.
	///
	/// Failing to start the source is fatal. Unusable checkpoints only cost their network a longer
	/// replay.
	pub async fn startup(&mut self) -> Result<(), SyncError> {
		if self.lifecycle != Lifecycle::Created {
			return Err(SyncError::SyncError(
				"orchestrator was already started".to_string(),
			));
		}
		info!(
			"Starting channel state sync with {} as event source",
			self.source.name()
		);

		let resume_height = self.restore_checkpoints().await?;
		self.source.set_resume_height(resume_height);
		for (kind, tier) in self.dispatcher.subscriptions() {
			self.source.subscribe(kind, tier);
		}

		let (update_tx, update_rx) = mpsc::channel(UPDATE_BUFFER);
		if let Err(e) = self.source.start(update_tx).await {
			error!("Failed to start {}: {}", self.source.name(), e);
			self.lifecycle = Lifecycle::Stopped;
			return Err(e.into());
		}

		self.updates = Some(update_rx);
		self.tracker = SyncProgressTracker::new(resume_height);
		self.last_autosave_height = resume_height;
		self.lifecycle = Lifecycle::Running;
		info!("Syncing {} networks from block {}", self.registry.len(), resume_height);
		Ok(())
	}

	/// Load the newest checkpoint of every known network and return the resume height.
	async fn restore_checkpoints(&mut self) -> Result<u64, SyncError> {
		let default_height = self.config.default_start_height;
		if !self.config.load_checkpoints {
			info!("Checkpoint loading disabled, replaying from block {}", default_height);
			return Ok(default_height);
		}

		let candidates = match &self.policy {
			FollowPolicy::Static(addresses) => addresses.clone(),
			FollowPolicy::Registry(_) => match self.store.list_networks().await {
				Ok(addresses) => addresses,
				Err(e) => {
					warn!(
						"Cannot list checkpointed networks, replaying from block {}: {}",
						default_height, e
					);
					return Ok(default_height);
				}
			},
		};

		let mut heights = Vec::new();
		let mut incomplete = false;
		for address in candidates {
			match self.store.load(&address).await {
				Ok(Some(loaded)) => {
					heights.push(loaded.height);
					self.registry.restore(loaded.graph, loaded.height);
				}
				Ok(None) => {
					info!("No checkpoint for {}, replaying it from block {}", address, default_height);
					incomplete = true;
				}
				Err(e) => {
					warn!(
						"Ignoring unusable checkpoint for {}, replaying it from block {}: {}",
						address, default_height, e
					);
					incomplete = true;
				}
			}
		}

		// A listed network without a checkpoint needs the full history. Registry networks announced
		// after the oldest checkpoint are rediscovered by the replay.
		if incomplete {
			heights.push(default_height);
		}
		Ok(CheckpointStore::resume_height(&heights).unwrap_or(default_height))
	}

	/// Run until stopped or until the event source finishes.
	///
	/// A dispatch failure ends the loop without a final checkpoint, so the next start replays from
	/// the last checkpoint written while state was known to be consistent.
	pub async fn run(&mut self) -> Result<(), SyncError> {
		if self.lifecycle == Lifecycle::Created {
			self.startup().await?;
		}

		let result = self.control_loop().await;
		let shutdown = self.shutdown(result.is_ok()).await;
		result.and(shutdown)
	}

	async fn control_loop(&mut self) -> Result<(), SyncError> {
		let Some(mut updates) = self.updates.take() else {
			return Err(SyncError::SyncError("orchestrator is not running".to_string()));
		};
		let mut stop_rx = self.stop_tx.subscribe();

		loop {
			if *stop_rx.borrow_and_update() {
				break;
			}

			let update = tokio::select! {
				biased;
				_ = stop_rx.changed() => continue,
				update = updates.recv() => update,
			};

			match update {
				Some(update) => self.handle_update(update).await?,
				None => {
					info!("Ledger event source finished");
					break;
				}
			}
		}
		Ok(())
	}

	async fn handle_update(&mut self, update: SourceUpdate) -> Result<(), SyncError> {
		match update {
			SourceUpdate::Event(envelope) => {
				let outcome = self.dispatcher.dispatch(&envelope, &mut self.registry)?;
				self.tracker.record_event(envelope.tier, outcome);
			}
			SourceUpdate::BlockConfirmed(height) => {
				self.registry.advance_synced_height(height);
				self.tracker.record_block_confirmed(height);
				self.tracker.log_progress(false);
				self.autosave(height).await;
			}
		}
		Ok(())
	}

	async fn autosave(&mut self, height: u64) {
		let Some(interval) = self.config.checkpoint_interval else {
			return;
		};
		if height < self.last_autosave_height.saturating_add(interval) {
			return;
		}

		self.last_autosave_height = height;
		self.save_checkpoints().await;
		for address in self.registry.addresses() {
			if let Err(e) = self.store.cleanup(&address, self.config.checkpoint_keep).await {
				warn!("Failed to clean up checkpoints of {}: {}", address, e);
			}
		}
	}

	/// Save every network at the highest confirmed block its graph reflects. Returns how many
	/// networks were saved.
	///
	/// Failures are logged per network and do not stop the others.
	pub async fn save_checkpoints(&self) -> usize {
		let records: Vec<CheckpointRecord> = self
			.registry
			.iter()
			.map(|network| CheckpointRecord::capture(&network.graph, network.synced_height))
			.collect();

		let mut saved = 0;
		for record in &records {
			match self.store.save_record(record).await {
				Ok(_) => saved += 1,
				Err(e) => error!(
					"Failed to save checkpoint for {} at height {}: {}",
					record.network_address, record.confirmed_height, e
				),
			}
		}
		saved
	}

	/// Stop the event source, then optionally save final checkpoints. Idempotent.
	pub async fn shutdown(&mut self, save: bool) -> Result<(), SyncError> {
		if self.lifecycle == Lifecycle::Stopped {
			return Ok(());
		}
		self.stop_tx.send_replace(true);
		self.lifecycle = Lifecycle::Stopped;

		// The receiver goes first so the source can never block on a full channel.
		drop(self.updates.take());
		let stopped = self.source.stop().await;

		if save && self.config.save_on_shutdown {
			let saved = self.save_checkpoints().await;
			info!("Saved final checkpoints for {} networks", saved);
		}

		self.tracker.log_progress(true);
		info!("{}", self.tracker.get_stats().summary());
		stopped.map_err(SyncError::from)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::testing::ScriptedEventSource;
	use crate::ledger::{EventEnvelope, EventKind, EventTier, LedgerError, LedgerEvent};
	use crate::network::{ChannelGraph, ChannelId, ChannelStatus};

	fn addr(byte: u8) -> Address {
		Address::from_bytes([byte; 20])
	}

	fn id(raw: u64) -> ChannelId {
		ChannelId::new(raw).unwrap()
	}

	fn network_x() -> Address {
		addr(0xee)
	}

	fn confirmed(block_number: u64, emitter: Address, event: LedgerEvent) -> SourceUpdate {
		SourceUpdate::Event(EventEnvelope {
			tier: EventTier::Confirmed,
			block_number,
			log_index: 0,
			emitter,
			event,
		})
	}

	fn opened(channel: u64, p1: Address, p2: Address) -> LedgerEvent {
		LedgerEvent::ChannelOpened {
			channel_id: id(channel),
			participant1: p1,
			participant2: p2,
		}
	}

	fn deposit(channel: u64, participant: Address, total_deposit: u128) -> LedgerEvent {
		LedgerEvent::ChannelNewDeposit {
			channel_id: id(channel),
			participant,
			total_deposit,
		}
	}

	fn config(dir: &tempfile::TempDir, follow: Vec<Address>) -> ServiceConfig {
		ServiceConfig {
			follow_networks: follow,
			data_dir: dir.path().to_path_buf(),
			..ServiceConfig::default()
		}
	}

	#[tokio::test]
	async fn test_restart_resumes_from_checkpoint() {
		let dir = tempfile::tempdir().unwrap();
		let p1 = addr(1);
		let p2 = addr(2);

		let first_run = ScriptedEventSource::new(vec![
			confirmed(100, network_x(), opened(42, p1, p2)),
			confirmed(200, network_x(), deposit(42, p1, 100)),
			SourceUpdate::BlockConfirmed(500),
		]);
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(first_run)).unwrap();
		orchestrator.run().await.unwrap();

		let store = CheckpointStore::new(dir.path().to_path_buf());
		assert_eq!(store.latest(&network_x()).await.unwrap(), Some(500));

		let second_run = ScriptedEventSource::new(vec![
			confirmed(505, network_x(), deposit(42, p1, 150)),
			SourceUpdate::BlockConfirmed(505),
		]);
		let probe = second_run.probe();
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(second_run)).unwrap();
		orchestrator.run().await.unwrap();

		assert_eq!(probe.lock().unwrap().started_from, Some(500));
		let projection = orchestrator.project(&network_x()).unwrap();
		assert_eq!(projection.channel_count, 1);
		assert_eq!(projection.node_count, 2);
		let channel = projection.channel(id(42)).unwrap();
		assert_eq!(channel.deposit1, 150);
		assert_eq!(channel.deposit2, 0);
		assert_eq!(store.latest(&network_x()).await.unwrap(), Some(505));
	}

	#[tokio::test]
	async fn test_unknown_network_leaves_state_unchanged() {
		let dir = tempfile::tempdir().unwrap();
		let source = ScriptedEventSource::new(vec![
			confirmed(10, network_x(), opened(1, addr(1), addr(2))),
			confirmed(11, addr(0xdd), opened(2, addr(3), addr(4))),
			confirmed(12, addr(0xdd), deposit(1, addr(1), 500)),
		]);
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(source)).unwrap();
		orchestrator.startup().await.unwrap();
		orchestrator.control_loop().await.unwrap();

		let before = {
			let mut graph = ChannelGraph::new(network_x());
			graph.handle_channel_opened(id(1), addr(1), addr(2)).unwrap();
			graph.project()
		};
		assert_eq!(orchestrator.project(&network_x()).unwrap(), before);
		assert!(orchestrator.project(&addr(0xdd)).is_none());
		assert_eq!(orchestrator.registry().len(), 1);
		assert_eq!(orchestrator.progress().dropped, 2);
	}

	#[tokio::test]
	async fn test_stop_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let source = ScriptedEventSource::new(vec![SourceUpdate::BlockConfirmed(1)]);
		let probe = source.probe();
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(source)).unwrap();

		let handle = orchestrator.stop_handle();
		handle.stop();
		handle.clone().stop();
		assert!(handle.is_stopped());

		orchestrator.run().await.unwrap();
		orchestrator.shutdown(true).await.unwrap();
		handle.stop();
		assert_eq!(probe.lock().unwrap().stop_calls, 1);
	}

	#[tokio::test]
	async fn test_stop_from_another_task() {
		let dir = tempfile::tempdir().unwrap();
		let source = ScriptedEventSource::new(Vec::new());
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(source)).unwrap();
		orchestrator.startup().await.unwrap();

		// Keep the update channel open so only the stop signal can end the loop.
		let (update_tx, update_rx) = mpsc::channel(1);
		orchestrator.updates = Some(update_rx);

		let handle = orchestrator.stop_handle();
		let stopper = tokio::spawn(async move {
			tokio::task::yield_now().await;
			handle.stop();
		});
		orchestrator.run().await.unwrap();
		stopper.await.unwrap();
		drop(update_tx);
	}

	#[tokio::test]
	async fn test_unreachable_source_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		let mut orchestrator = SyncOrchestrator::new(
			config(&dir, vec![network_x()]),
			Box::new(ScriptedEventSource::unreachable()),
		)
		.unwrap();

		let err = orchestrator.run().await.unwrap_err();
		assert!(matches!(
			err,
			SyncError::LedgerError(LedgerError::Unreachable(_))
		));
	}

	#[tokio::test]
	async fn test_missing_network_source_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let result = SyncOrchestrator::new(
			config(&dir, Vec::new()),
			Box::new(ScriptedEventSource::new(Vec::new())),
		);
		assert!(matches!(result, Err(SyncError::ConfigError(_))));
	}

	#[tokio::test]
	async fn test_registry_mode_creates_networks_lazily() {
		let dir = tempfile::tempdir().unwrap();
		let registry = addr(0x99);
		let network_y = addr(0xdd);
		let source = ScriptedEventSource::new(vec![
			confirmed(
				10,
				registry,
				LedgerEvent::TokenNetworkCreated {
					network_address: network_x(),
				},
			),
			confirmed(11, network_x(), opened(1, addr(1), addr(2))),
			confirmed(12, network_y, opened(1, addr(3), addr(4))),
			SourceUpdate::BlockConfirmed(12),
		]);
		let probe = source.probe();
		let config = ServiceConfig {
			registry_address: Some(registry),
			data_dir: dir.path().to_path_buf(),
			default_start_height: 7,
			..ServiceConfig::default()
		};
		let mut orchestrator = SyncOrchestrator::new(config, Box::new(source)).unwrap();
		orchestrator.run().await.unwrap();

		assert_eq!(orchestrator.registry().addresses(), vec![network_x()]);
		assert_eq!(orchestrator.project(&network_x()).unwrap().channel_count, 1);

		let probe = probe.lock().unwrap();
		assert_eq!(probe.started_from, Some(7));
		assert!(
			probe
				.subscriptions
				.contains(&(EventKind::TokenNetworkCreated, EventTier::Confirmed))
		);
	}

	#[tokio::test]
	async fn test_resume_height_is_minimum_of_checkpoints() {
		let dir = tempfile::tempdir().unwrap();
		let store = CheckpointStore::new(dir.path().to_path_buf());
		let networks = [addr(0xa1), addr(0xa2), addr(0xa3)];
		for (network, height) in networks.iter().zip([200, 350, 180]) {
			store.save(height, &ChannelGraph::new(*network)).await.unwrap();
		}

		let source = ScriptedEventSource::new(Vec::new());
		let probe = source.probe();
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, networks.to_vec()), Box::new(source)).unwrap();
		orchestrator.startup().await.unwrap();
		assert_eq!(probe.lock().unwrap().started_from, Some(180));
		assert_eq!(
			orchestrator.registry().lookup(&networks[1]).unwrap().checkpoint_height,
			Some(350)
		);
		orchestrator.shutdown(false).await.unwrap();
	}

	#[tokio::test]
	async fn test_registry_mode_resumes_from_checkpoints() {
		let dir = tempfile::tempdir().unwrap();
		let store = CheckpointStore::new(dir.path().to_path_buf());
		let network_a = addr(0xa1);
		let network_b = addr(0xa2);
		store.save(200, &ChannelGraph::new(network_a)).await.unwrap();
		store.save(350, &ChannelGraph::new(network_b)).await.unwrap();

		let source = ScriptedEventSource::new(Vec::new());
		let probe = source.probe();
		let config = ServiceConfig {
			registry_address: Some(addr(0x99)),
			data_dir: dir.path().to_path_buf(),
			..ServiceConfig::default()
		};
		let mut orchestrator = SyncOrchestrator::new(config, Box::new(source)).unwrap();
		orchestrator.startup().await.unwrap();

		assert_eq!(probe.lock().unwrap().started_from, Some(200));
		assert_eq!(orchestrator.registry().addresses(), vec![network_a, network_b]);
		assert_eq!(
			orchestrator.registry().lookup(&network_b).unwrap().checkpoint_height,
			Some(350)
		);
		orchestrator.shutdown(false).await.unwrap();
	}

	#[tokio::test]
	async fn test_unlistable_data_dir_replays_from_default_height() {
		let dir = tempfile::tempdir().unwrap();
		let data_file = dir.path().join("not-a-directory");
		std::fs::write(&data_file, b"").unwrap();

		let source = ScriptedEventSource::new(Vec::new());
		let probe = source.probe();
		let config = ServiceConfig {
			registry_address: Some(addr(0x99)),
			data_dir: data_file,
			default_start_height: 9,
			..ServiceConfig::default()
		};
		let mut orchestrator = SyncOrchestrator::new(config, Box::new(source)).unwrap();
		orchestrator.startup().await.unwrap();

		assert_eq!(probe.lock().unwrap().started_from, Some(9));
		assert!(orchestrator.registry().is_empty());
		orchestrator.shutdown(false).await.unwrap();
	}

	#[tokio::test]
	async fn test_events_after_last_marker_are_saved_at_their_block() {
		let dir = tempfile::tempdir().unwrap();
		let store = CheckpointStore::new(dir.path().to_path_buf());
		store.save(500, &ChannelGraph::new(network_x())).await.unwrap();

		// The range containing block 505 is cut off before its marker.
		let source = ScriptedEventSource::new(vec![confirmed(
			505,
			network_x(),
			opened(1, addr(1), addr(2)),
		)]);
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(source)).unwrap();
		orchestrator.run().await.unwrap();

		assert_eq!(
			store.list_checkpoints(&network_x()).await.unwrap(),
			vec![500, 505]
		);
		let loaded = store.load(&network_x()).await.unwrap().unwrap();
		assert_eq!(loaded.height, 505);
		assert_eq!(loaded.graph.channel_count(), 1);

		let source = ScriptedEventSource::new(vec![
			confirmed(505, network_x(), opened(1, addr(1), addr(2))),
			SourceUpdate::BlockConfirmed(505),
		]);
		let probe = source.probe();
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(source)).unwrap();
		orchestrator.run().await.unwrap();

		assert_eq!(probe.lock().unwrap().started_from, Some(505));
		assert_eq!(orchestrator.progress().skipped, 1);
		assert_eq!(orchestrator.project(&network_x()).unwrap().channel_count, 1);
	}

	#[tokio::test]
	async fn test_invalid_checkpoint_falls_back_to_default_height() {
		let dir = tempfile::tempdir().unwrap();
		let store = CheckpointStore::new(dir.path().to_path_buf());
		let healthy = addr(0xa1);
		let broken = addr(0xa2);
		store.save(300, &ChannelGraph::new(healthy)).await.unwrap();

		let broken_dir = dir.path().join(broken.to_checksum());
		std::fs::create_dir_all(&broken_dir).unwrap();
		std::fs::write(broken_dir.join("block_400.graph-checkpoint"), b"{\"version\": 1}").unwrap();

		let source = ScriptedEventSource::new(Vec::new());
		let probe = source.probe();
		let config = ServiceConfig {
			default_start_height: 25,
			..config(&dir, vec![healthy, broken])
		};
		let mut orchestrator = SyncOrchestrator::new(config, Box::new(source)).unwrap();
		orchestrator.startup().await.unwrap();

		assert_eq!(probe.lock().unwrap().started_from, Some(25));
		let broken_network = orchestrator.registry().lookup(&broken).unwrap();
		assert_eq!(broken_network.checkpoint_height, None);
		assert_eq!(broken_network.graph.channel_count(), 0);
		orchestrator.shutdown(false).await.unwrap();
	}

	#[tokio::test]
	async fn test_disabled_checkpoint_loading_ignores_checkpoints() {
		let dir = tempfile::tempdir().unwrap();
		let store = CheckpointStore::new(dir.path().to_path_buf());
		store.save(300, &ChannelGraph::new(network_x())).await.unwrap();

		let source = ScriptedEventSource::new(Vec::new());
		let probe = source.probe();
		let config = ServiceConfig {
			load_checkpoints: false,
			..config(&dir, vec![network_x()])
		};
		let mut orchestrator = SyncOrchestrator::new(config, Box::new(source)).unwrap();
		orchestrator.startup().await.unwrap();
		assert_eq!(probe.lock().unwrap().started_from, Some(0));
		orchestrator.shutdown(false).await.unwrap();
	}

	#[tokio::test]
	async fn test_tentative_events_do_not_mutate() {
		let dir = tempfile::tempdir().unwrap();
		let source = ScriptedEventSource::new(vec![
			SourceUpdate::Event(EventEnvelope {
				tier: EventTier::Tentative,
				block_number: 20,
				log_index: 0,
				emitter: network_x(),
				event: opened(1, addr(1), addr(2)),
			}),
			confirmed(
				21,
				network_x(),
				LedgerEvent::ChannelClosed { channel_id: id(1) },
			),
		]);
		let mut orchestrator =
			SyncOrchestrator::new(config(&dir, vec![network_x()]), Box::new(source)).unwrap();
		orchestrator.run().await.unwrap();

		assert_eq!(orchestrator.project(&network_x()).unwrap().channel_count, 0);
		let stats = orchestrator.progress();
		assert_eq!(stats.tentative_events, 1);
		assert_eq!(stats.skipped, 1);
		assert_eq!(stats.dropped, 1);
	}

	#[tokio::test]
	async fn test_autosave_keeps_newest_checkpoints() {
		let dir = tempfile::tempdir().unwrap();
		let source = ScriptedEventSource::new(vec![
			confirmed(50, network_x(), opened(1, addr(1), addr(2))),
			SourceUpdate::BlockConfirmed(100),
			confirmed(150, network_x(), LedgerEvent::ChannelClosed { channel_id: id(1) }),
			SourceUpdate::BlockConfirmed(150),
			SourceUpdate::BlockConfirmed(200),
			SourceUpdate::BlockConfirmed(300),
		]);
		let config = ServiceConfig {
			checkpoint_interval: Some(100),
			checkpoint_keep: 2,
			save_on_shutdown: false,
			..config(&dir, vec![network_x()])
		};
		let mut orchestrator = SyncOrchestrator::new(config, Box::new(source)).unwrap();
		orchestrator.run().await.unwrap();

		let store = CheckpointStore::new(dir.path().to_path_buf());
		assert_eq!(
			store.list_checkpoints(&network_x()).await.unwrap(),
			vec![200, 300]
		);
		let loaded = store.load(&network_x()).await.unwrap().unwrap();
		assert_eq!(
			loaded.graph.channel(id(1)).unwrap().status,
			ChannelStatus::Closed
		);
	}

	#[tokio::test]
	async fn test_startup_twice_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let mut orchestrator = SyncOrchestrator::new(
			config(&dir, vec![network_x()]),
			Box::new(ScriptedEventSource::new(Vec::new())),
		)
		.unwrap();
		orchestrator.startup().await.unwrap();
		assert!(matches!(
			orchestrator.startup().await,
			Err(SyncError::SyncError(_))
		));
		orchestrator.shutdown(false).await.unwrap();
	}
}
