use crate::network::Address;

/// Errors raised while saving or restoring checkpoints
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Checkpoint encoding error: {0}")]
	EncodeError(String),

	#[error("Invalid checkpoint: {0}")]
	InvalidCheckpoint(String),

	#[error("Unsupported checkpoint version {found}, expected {expected}")]
	UnsupportedVersion { found: u32, expected: u32 },

	#[error("Checkpoint for {network} at height {height} already exists with different content")]
	ConflictingCheckpoint { network: Address, height: u64 },
}

impl CheckpointError {
	/// The stored data cannot be used, as opposed to the storage being unreachable.
	pub fn is_invalid(&self) -> bool {
		matches!(
			self,
			CheckpointError::InvalidCheckpoint(_) | CheckpointError::UnsupportedVersion { .. }
		)
	}
}
