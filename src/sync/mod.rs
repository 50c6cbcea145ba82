//! Channel state synchronization
//!
//! - `orchestrator`: lifecycle of the service, from checkpoint restore to the final save.
//! - `events`: handlers per event kind and tier, and the dispatcher routing to them.
//! - `progress_tracker`: event counts and confirmed height for progress logging.

/// Event handlers and dispatch routing
pub mod events;
/// Main coordinator of the sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
mod types;

pub use orchestrator::{StopHandle, SyncOrchestrator};
pub use progress_tracker::SyncStats;
pub use types::SyncError;
