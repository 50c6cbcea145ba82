use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::ledger::{EventKind, LedgerError};
use crate::network::GraphError;

/// Errors that stop the sync service
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Configuration error: {0}")]
	ConfigError(#[from] ConfigError),

	#[error("Ledger error: {0}")]
	LedgerError(#[from] LedgerError),

	#[error("Checkpoint error: {0}")]
	CheckpointError(#[from] CheckpointError),

	#[error("Dispatch of {kind} at block {block_number} failed: {source}")]
	DispatchError {
		kind: EventKind,
		block_number: u64,
		source: GraphError,
	},

	#[error("Sync error: {0}")]
	SyncError(String),
}
