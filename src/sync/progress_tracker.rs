//! Progress tracking for the sync loop.
//!
//! `SyncProgressTracker` counts delivered events per tier and per outcome and remembers the highest
//! confirmed block. It logs a progress line every 1000 confirmed blocks.

use crate::ledger::EventTier;
use crate::sync::events::HandleOutcome;

use tracing::info;

const LOG_EVERY_BLOCKS: u64 = 1000;

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	/// Height the event source resumed from
	start_height: u64,
	/// Highest block for which all confirmed events were delivered
	highest_confirmed_block: Option<u64>,
	/// Last block at which we logged progress
	last_logged_block: u64,
	confirmed_events: usize,
	tentative_events: usize,
	applied: usize,
	unchanged: usize,
	skipped: usize,
	dropped: usize,
}

impl SyncProgressTracker {
	pub fn new(start_height: u64) -> Self {
		Self {
			start_height,
			highest_confirmed_block: None,
			last_logged_block: start_height,
			confirmed_events: 0,
			tentative_events: 0,
			applied: 0,
			unchanged: 0,
			skipped: 0,
			dropped: 0,
		}
	}

	pub fn record_event(&mut self, tier: EventTier, outcome: HandleOutcome) {
		match tier {
			EventTier::Confirmed => self.confirmed_events += 1,
			EventTier::Tentative => self.tentative_events += 1,
		}
		match outcome {
			HandleOutcome::Applied => self.applied += 1,
			HandleOutcome::Unchanged => self.unchanged += 1,
			HandleOutcome::Skipped => self.skipped += 1,
			HandleOutcome::Dropped => self.dropped += 1,
		}
	}

	pub fn record_block_confirmed(&mut self, height: u64) {
		self.highest_confirmed_block = Some(
			self.highest_confirmed_block
				.map_or(height, |current| current.max(height)),
		);
	}

	pub fn highest_confirmed_block(&self) -> Option<u64> {
		self.highest_confirmed_block
	}

	/// Log progress every 1000 confirmed blocks or when forced
	pub fn log_progress(&mut self, force: bool) {
		let Some(highest) = self.highest_confirmed_block else {
			return;
		};
		let blocks_since_last_log = highest.saturating_sub(self.last_logged_block);

		if force || blocks_since_last_log >= LOG_EVERY_BLOCKS {
			info!(
				"Sync progress: confirmed up to block {}, {} events applied, {} dropped",
				highest, self.applied, self.dropped
			);
			self.last_logged_block = highest;
		}
	}

	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			start_height: self.start_height,
			highest_confirmed_block: self.highest_confirmed_block,
			confirmed_events: self.confirmed_events,
			tentative_events: self.tentative_events,
			applied: self.applied,
			unchanged: self.unchanged,
			skipped: self.skipped,
			dropped: self.dropped,
		}
	}
}

/// Statistics about the sync progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
	pub start_height: u64,
	pub highest_confirmed_block: Option<u64>,
	pub confirmed_events: usize,
	pub tentative_events: usize,
	pub applied: usize,
	/// Re-deliveries that did not change any state
	pub unchanged: usize,
	/// Covered by a checkpoint or only observed
	pub skipped: usize,
	/// Malformed or addressed to an unknown network
	pub dropped: usize,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		format!(
			"Sync from {} to {}: {} confirmed and {} tentative events, {} applied, {} unchanged, {} skipped{}",
			self.start_height,
			self.highest_confirmed_block
				.map_or_else(|| "nothing confirmed".to_string(), |height| height.to_string()),
			self.confirmed_events,
			self.tentative_events,
			self.applied,
			self.unchanged,
			self.skipped,
			if self.dropped == 0 {
				String::new()
			} else {
				format!(" ({} dropped)", self.dropped)
			}
		)
	}
}
