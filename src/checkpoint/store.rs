//! Checkpoint store.
//!
//! `CheckpointStore` persists the graph of one network at a confirmed height and restores the
//! newest one on startup. It sits on top of a `CheckpointRepository` which only deals with bytes;
//! schema handling, conflict detection and retention live here.

use crate::checkpoint::repository::{CheckpointRepository, FileCheckpointRepository};
use crate::checkpoint::schema::CheckpointRecord;
use crate::checkpoint::types::CheckpointError;
use crate::network::{Address, ChannelGraph};

use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// A graph restored from the newest checkpoint of a network.
#[derive(Debug)]
pub struct LoadedCheckpoint {
	pub graph: ChannelGraph,
	pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
	Written(PathBuf),
	/// An identical checkpoint already existed at this height.
	AlreadyPresent,
}

pub struct CheckpointStore {
	repository: Box<dyn CheckpointRepository>,
}

impl CheckpointStore {
	/// Create a file-backed store rooted at `data_dir`.
	pub fn new(data_dir: PathBuf) -> Self {
		Self::with_repository(Box::new(FileCheckpointRepository::new(data_dir)))
	}

	pub fn with_repository(repository: Box<dyn CheckpointRepository>) -> Self {
		Self { repository }
	}

	/// Persist `graph` as the state of its network at `confirmed_height`.
	///
	/// The graph is copied before anything is written, so later mutations of the live graph do
	/// not leak into the checkpoint. Saving the same state twice is a no-op; saving different
	/// state at an existing height fails with `ConflictingCheckpoint`.
	pub async fn save(
		&self,
		confirmed_height: u64,
		graph: &ChannelGraph,
	) -> Result<SaveOutcome, CheckpointError> {
		let record = CheckpointRecord::capture(graph, confirmed_height);
		self.save_record(&record).await
	}

	pub async fn save_record(&self, record: &CheckpointRecord) -> Result<SaveOutcome, CheckpointError> {
		let network = record.network_address;
		let height = record.confirmed_height;

		if let Some(existing) = self.repository.read(&network, height).await? {
			return match CheckpointRecord::decode(&existing) {
				Ok(existing) if existing.same_state(record) => {
					debug!(
						"Checkpoint for {} at height {} already present",
						network, height
					);
					Ok(SaveOutcome::AlreadyPresent)
				}
				_ => {
					error!(
						"Refusing to overwrite checkpoint for {} at height {} with different content",
						network, height
					);
					Err(CheckpointError::ConflictingCheckpoint { network, height })
				}
			};
		}

		let bytes = record.encode()?;
		let path = self.repository.write(&network, height, &bytes).await?;
		info!(
			"Checkpoint saved: {} channels of {} at height {} written to {:?}",
			record.channels.len(),
			network,
			height,
			path
		);
		Ok(SaveOutcome::Written(path))
	}

	/// Heights of all checkpoints of `network`, ascending.
	pub async fn list_checkpoints(&self, network: &Address) -> Result<Vec<u64>, CheckpointError> {
		self.repository.list_heights(network).await
	}

	pub async fn latest(&self, network: &Address) -> Result<Option<u64>, CheckpointError> {
		let heights = self.list_checkpoints(network).await?;
		Ok(select_latest(&heights))
	}

	/// Restore the newest checkpoint of `network`, `Ok(None)` if there is none.
	///
	/// An unreadable newest checkpoint is an error; older checkpoints are not tried.
	pub async fn load(&self, network: &Address) -> Result<Option<LoadedCheckpoint>, CheckpointError> {
		let Some(height) = self.latest(network).await? else {
			return Ok(None);
		};
		let Some(bytes) = self.repository.read(network, height).await? else {
			warn!(
				"Checkpoint for {} at height {} vanished while loading",
				network, height
			);
			return Ok(None);
		};

		let record = CheckpointRecord::decode(&bytes)?;
		if record.network_address != *network {
			return Err(CheckpointError::InvalidCheckpoint(format!(
				"checkpoint stored for {} belongs to {}",
				network, record.network_address
			)));
		}
		if record.confirmed_height != height {
			return Err(CheckpointError::InvalidCheckpoint(format!(
				"checkpoint stored at height {} claims height {}",
				height, record.confirmed_height
			)));
		}

		let graph = record.into_graph()?;
		info!(
			"Loaded checkpoint for {} at height {}: {} nodes, {} channels",
			network,
			height,
			graph.node_count(),
			graph.channel_count()
		);
		Ok(Some(LoadedCheckpoint { graph, height }))
	}

	/// Networks with at least one stored checkpoint.
	pub async fn list_networks(&self) -> Result<Vec<Address>, CheckpointError> {
		self.repository.list_networks().await
	}

	/// Remove all but the newest `keep_count` checkpoints of `network`. Returns how many were removed.
	pub async fn cleanup(&self, network: &Address, keep_count: usize) -> Result<usize, CheckpointError> {
		let heights = self.list_checkpoints(network).await?;
		if heights.len() <= keep_count {
			return Ok(0);
		}

		let mut removed = 0;
		for height in &heights[..heights.len() - keep_count] {
			match self.repository.remove(network, *height).await {
				Ok(()) => removed += 1,
				Err(e) => warn!(
					"Failed to remove old checkpoint of {} at height {}: {}",
					network, height, e
				),
			}
		}
		Ok(removed)
	}

	/// Height from which the ledger must be replayed so that every restored network catches up.
	pub fn resume_height(checkpoint_heights: &[u64]) -> Option<u64> {
		checkpoint_heights.iter().copied().min()
	}
}

/// Numerically greatest height.
pub fn select_latest(heights: &[u64]) -> Option<u64> {
	heights.iter().copied().max()
}
