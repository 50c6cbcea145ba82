use crate::ledger::types::{EventKind, EventTier, LedgerError, SourceUpdate};

use tokio::sync::mpsc;

/// Contract of a ledger event source.
///
/// The consumer subscribes to (kind, tier) pairs and sets the resume height before `start`. The
/// source then pushes updates into the sink in observation order, one tier never reordered.
#[async_trait::async_trait]
pub trait LedgerEventSource: Send + Sync {
	/// Deliver events of `kind` in `tier`. Only valid before `start`.
	fn subscribe(&mut self, kind: EventKind, tier: EventTier);

	/// First block the confirmed tier is fetched from.
	fn resume_height(&self) -> u64;

	fn set_resume_height(&mut self, height: u64);

	/// Begin delivering updates into `sink`.
	///
	/// Failing to reach the ledger here is fatal for the caller.
	async fn start(&mut self, sink: mpsc::Sender<SourceUpdate>) -> Result<(), LedgerError>;

	/// Stop delivering. Returns once no further update can reach the sink.
	/// Stopping a source that is not running is a no-op.
	async fn stop(&mut self) -> Result<(), LedgerError>;

	/// Get the name of this source for logging.
	fn name(&self) -> &'static str;
}
