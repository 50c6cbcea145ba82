//! Event-sourced channel graph state with checkpoint and resume.
//!
//! Follows one or more payment channel networks on a ledger, keeps an in-memory graph of their
//! channels and participant deposits, and checkpoints that graph so a restart only replays the
//! ledger history after the newest checkpoint.

pub mod checkpoint;
pub mod config;
pub mod ledger;
pub mod network;
pub mod sync;
