use channel_state_sync::config::{ServiceConfig, default_data_dir};
use channel_state_sync::ledger::JsonRpcEventSource;
use channel_state_sync::network::Address;
use channel_state_sync::sync::SyncOrchestrator;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "channel-state-sync", version, about = "Follows payment channel networks and checkpoints their channel graphs")]
struct Cli {
	/// JSON-RPC endpoint of the ledger node
	#[arg(long, env = "ETH_RPC", default_value = "http://localhost:8545")]
	eth_rpc: String,

	/// Registry contract announcing new networks
	#[arg(long, env = "REGISTRY_ADDRESS")]
	registry_address: Option<Address>,

	/// Checksummed addresses of networks to follow; takes precedence over the registry
	#[arg(long = "follow-network", env = "FOLLOW_NETWORKS", value_delimiter = ',')]
	follow_networks: Vec<String>,

	/// Start from scratch instead of restoring checkpoints
	#[arg(long)]
	no_load_checkpoints: bool,

	/// Skip the final checkpoint on shutdown
	#[arg(long)]
	no_shutdown_checkpoint: bool,

	/// Checkpoint directory [default: $HOME/.channel-state-sync]
	#[arg(long, env = "DATA_DIR")]
	data_dir: Option<PathBuf>,

	/// Block to replay from when no checkpoint is usable
	#[arg(long, default_value_t = 0)]
	start_block: u64,

	/// Blocks until an event counts as confirmed
	#[arg(long, default_value_t = 5)]
	confirmations: u64,

	/// Seconds between two polls of the ledger
	#[arg(long, default_value_t = 1)]
	poll_interval: u64,

	/// Save checkpoints every N confirmed blocks
	#[arg(long)]
	checkpoint_interval: Option<u64>,

	/// Checkpoints kept per network
	#[arg(long, default_value_t = 2)]
	checkpoint_keep: usize,

	/// Log level for this service, overridden by RUST_LOG
	#[arg(long, default_value = "info")]
	log_level: String,
}

impl Cli {
	fn into_config(self) -> ServiceConfig {
		let follow_networks = self
			.follow_networks
			.iter()
			.filter_map(|raw| match Address::parse_checksummed(raw.trim()) {
				Ok(address) => Some(address),
				Err(e) => {
					warn!("Ignoring follow-network entry '{}': {}", raw, e);
					None
				}
			})
			.collect();

		ServiceConfig {
			eth_rpc: self.eth_rpc,
			registry_address: self.registry_address,
			follow_networks,
			load_checkpoints: !self.no_load_checkpoints,
			save_on_shutdown: !self.no_shutdown_checkpoint,
			data_dir: self.data_dir.unwrap_or_else(default_data_dir),
			default_start_height: self.start_block,
			confirmations: self.confirmations,
			poll_interval: Duration::from_secs(self.poll_interval),
			checkpoint_interval: self.checkpoint_interval,
			checkpoint_keep: self.checkpoint_keep,
		}
	}
}

fn init_tracing(log_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| {
			tracing_subscriber::EnvFilter::try_new(format!(
				"warn,channel_state_sync={}",
				log_level
			))
		})
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	init_tracing(&cli.log_level);

	let config = cli.into_config();
	info!("Starting channel state sync service against {}", config.eth_rpc);

	let source = match JsonRpcEventSource::new(
		config.eth_rpc.clone(),
		config.registry_address,
		config.poll_config(),
	) {
		Ok(source) => source,
		Err(e) => {
			error!("Failed to create ledger client: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let mut orchestrator = match SyncOrchestrator::new(config, Box::new(source)) {
		Ok(orchestrator) => orchestrator,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let stop_handle = orchestrator.stop_handle();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => {
				info!("Received Ctrl-C, shutting down");
				stop_handle.stop();
			}
			Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
		}
	});

	match orchestrator.run().await {
		Ok(()) => {
			info!("Channel state sync stopped");
			ExitCode::SUCCESS
		}
		Err(e) => {
			error!("Channel state sync terminated: {}", e);
			ExitCode::FAILURE
		}
	}
}
