//! Service configuration.
//!
//! `ServiceConfig` is built once at startup (by the binary from flags and environment) and handed
//! to the orchestrator by value.

use crate::ledger::PollConfig;
use crate::network::{Address, FollowPolicy};

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DATA_DIR_NAME: &str = ".channel-state-sync";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
	#[error("either a list of networks to follow or a registry address is required")]
	NoNetworkSource,

	#[error("Invalid configuration value: {0}")]
	InvalidValue(String),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
	/// JSON-RPC endpoint of the ledger node.
	pub eth_rpc: String,
	/// Registry contract announcing new networks. Ignored when `follow_networks` is set.
	pub registry_address: Option<Address>,
	pub follow_networks: Vec<Address>,
	/// Restore networks from their newest checkpoint on startup.
	pub load_checkpoints: bool,
	/// Save every network once more when the service stops.
	pub save_on_shutdown: bool,
	pub data_dir: PathBuf,
	/// Resume height used when no usable checkpoint bounds the replay.
	pub default_start_height: u64,
	/// Reorg-safety depth.
	pub confirmations: u64,
	pub poll_interval: Duration,
	/// Autosave every N confirmed blocks.
	pub checkpoint_interval: Option<u64>,
	/// Checkpoints kept per network after an autosave.
	pub checkpoint_keep: usize,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			eth_rpc: "http://localhost:8545".to_string(),
			registry_address: None,
			follow_networks: Vec::new(),
			load_checkpoints: true,
			save_on_shutdown: true,
			data_dir: default_data_dir(),
			default_start_height: 0,
			confirmations: 5,
			poll_interval: Duration::from_secs(1),
			checkpoint_interval: None,
			checkpoint_keep: 2,
		}
	}
}

impl ServiceConfig {
	/// Decide how networks are followed. A follow-list takes precedence over a registry.
	pub fn follow_policy(&self) -> Result<FollowPolicy, ConfigError> {
		match (&self.follow_networks[..], self.registry_address) {
			([], None) => Err(ConfigError::NoNetworkSource),
			([], Some(registry)) => Ok(FollowPolicy::Registry(registry)),
			(networks, registry) => {
				if let Some(registry) = registry {
					warn!(
						"Both a follow-list and registry {} are configured, following the list only",
						registry
					);
				}
				Ok(FollowPolicy::Static(networks.to_vec()))
			}
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.checkpoint_interval == Some(0) {
			return Err(ConfigError::InvalidValue(
				"checkpoint interval must be at least one block".to_string(),
			));
		}
		if self.checkpoint_keep == 0 {
			return Err(ConfigError::InvalidValue(
				"at least one checkpoint must be kept".to_string(),
			));
		}
		if self.poll_interval.is_zero() {
			return Err(ConfigError::InvalidValue(
				"poll interval must not be zero".to_string(),
			));
		}
		Ok(())
	}

	pub fn poll_config(&self) -> PollConfig {
		PollConfig {
			confirmations: self.confirmations,
			poll_interval: self.poll_interval,
			..PollConfig::default()
		}
	}
}

/// `$HOME/.channel-state-sync`, or a relative directory when no home is set.
pub fn default_data_dir() -> PathBuf {
	match std::env::var_os("HOME") {
		Some(home) if !home.is_empty() => PathBuf::from(home).join(DATA_DIR_NAME),
		_ => PathBuf::from(DATA_DIR_NAME),
	}
}
