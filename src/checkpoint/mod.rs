//! Checkpoint persistence
//!
//! Saves the channel graph of a network at a confirmed height and restores the newest checkpoint
//! on startup, so that only the ledger history after it has to be replayed.

pub mod repository;
pub mod schema;
pub mod store;
mod types;

pub use repository::{CheckpointRepository, FileCheckpointRepository};
pub use schema::{CHECKPOINT_VERSION, CheckpointRecord};
pub use store::{CheckpointStore, LoadedCheckpoint, SaveOutcome, select_latest};
pub use types::CheckpointError;
