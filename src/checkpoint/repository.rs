use crate::checkpoint::types::CheckpointError;
use crate::network::Address;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CHECKPOINT_PREFIX: &str = "block_";
const CHECKPOINT_SUFFIX: &str = ".graph-checkpoint";
const TEMP_SUFFIX: &str = ".tmp";

/// Storage of encoded checkpoints, addressed by network and confirmed height
#[async_trait::async_trait]
pub trait CheckpointRepository: Send + Sync {
	/// Store `bytes` so that readers never observe a partially written checkpoint.
	async fn write(
		&self,
		network: &Address,
		height: u64,
		bytes: &[u8],
	) -> Result<PathBuf, CheckpointError>;
	async fn read(&self, network: &Address, height: u64)
	-> Result<Option<Vec<u8>>, CheckpointError>;
	/// Heights of all stored checkpoints of `network`, ascending.
	async fn list_heights(&self, network: &Address) -> Result<Vec<u64>, CheckpointError>;
	/// Networks that have at least one stored checkpoint.
	async fn list_networks(&self) -> Result<Vec<Address>, CheckpointError>;
	async fn remove(&self, network: &Address, height: u64) -> Result<(), CheckpointError>;
}

/// File-based implementation of CheckpointRepository
///
/// Layout: `<data_dir>/<checksummed network address>/block_<height>.graph-checkpoint`.
pub struct FileCheckpointRepository {
	data_dir: PathBuf,
}

impl FileCheckpointRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	fn network_dir(&self, network: &Address) -> PathBuf {
		self.data_dir.join(network.to_checksum())
	}

	fn checkpoint_path(&self, network: &Address, height: u64) -> PathBuf {
		self.network_dir(network)
			.join(format!("{}{}{}", CHECKPOINT_PREFIX, height, CHECKPOINT_SUFFIX))
	}
}

/// Parse `block_<height>.graph-checkpoint`. Heights must be written in canonical decimal form.
pub fn parse_checkpoint_file_name(file_name: &str) -> Option<u64> {
	let digits = file_name
		.strip_prefix(CHECKPOINT_PREFIX)?
		.strip_suffix(CHECKPOINT_SUFFIX)?;
	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	let height = digits.parse::<u64>().ok()?;
	(height.to_string() == digits).then_some(height)
}

async fn read_dir_if_exists(path: &Path) -> Result<Option<tokio::fs::ReadDir>, CheckpointError> {
	match tokio::fs::read_dir(path).await {
		Ok(entries) => Ok(Some(entries)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e.into()),
	}
}

#[async_trait::async_trait]
impl CheckpointRepository for FileCheckpointRepository {
	async fn write(
		&self,
		network: &Address,
		height: u64,
		bytes: &[u8],
	) -> Result<PathBuf, CheckpointError> {
		let network_dir = self.network_dir(network);
		tokio::fs::create_dir_all(&network_dir).await?;

		let path = self.checkpoint_path(network, height);
		let mut temp_name = path.as_os_str().to_os_string();
		temp_name.push(TEMP_SUFFIX);
		let temp_path = PathBuf::from(temp_name);

		tokio::fs::write(&temp_path, bytes).await?;
		if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
			if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
				warn!("Failed to remove temporary checkpoint {:?}: {}", temp_path, cleanup);
			}
			return Err(e.into());
		}

		debug!("Wrote {} bytes to {:?}", bytes.len(), path);
		Ok(path)
	}

	async fn read(
		&self,
		network: &Address,
		height: u64,
	) -> Result<Option<Vec<u8>>, CheckpointError> {
		match tokio::fs::read(self.checkpoint_path(network, height)).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	async fn list_heights(&self, network: &Address) -> Result<Vec<u64>, CheckpointError> {
		let Some(mut entries) = read_dir_if_exists(&self.network_dir(network)).await? else {
			return Ok(Vec::new());
		};

		let mut heights = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			if !entry.file_type().await?.is_file() {
				continue;
			}
			if let Some(height) = entry
				.file_name()
				.to_str()
				.and_then(parse_checkpoint_file_name)
			{
				heights.push(height);
			}
		}

		heights.sort_unstable();
		Ok(heights)
	}

	async fn list_networks(&self) -> Result<Vec<Address>, CheckpointError> {
		let Some(mut entries) = read_dir_if_exists(&self.data_dir).await? else {
			return Ok(Vec::new());
		};

		let mut networks = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			if !entry.file_type().await?.is_dir() {
				continue;
			}
			let Some(network) = entry
				.file_name()
				.to_str()
				.and_then(|name| Address::parse_checksummed(name).ok())
			else {
				continue;
			};
			if !self.list_heights(&network).await?.is_empty() {
				networks.push(network);
			}
		}

		networks.sort();
		Ok(networks)
	}

	async fn remove(&self, network: &Address, height: u64) -> Result<(), CheckpointError> {
		let path = self.checkpoint_path(network, height);
		tokio::fs::remove_file(&path).await?;
		info!("Removed old checkpoint: {:?}", path);
		Ok(())
	}
}
