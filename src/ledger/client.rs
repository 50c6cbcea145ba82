//! JSON-RPC ledger event source.
//!
//! Polls `eth_blockNumber` and `eth_getLogs` over HTTP. Logs up to the chain head are delivered
//! in the tentative tier, logs up to `head - confirmations` in the confirmed tier, each confirmed
//! range followed by a `BlockConfirmed` marker. Polling runs in one spawned task which `stop`
//! signals and awaits.

use crate::ledger::decode::{RpcLog, decode_log, format_quantity, parse_quantity, topic_hex};
use crate::ledger::source::LedgerEventSource;
use crate::ledger::types::{EventKind, EventTier, LedgerError, LedgerEvent, SourceUpdate};
use crate::network::Address;

use backoff::{ExponentialBackoff, future::retry};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Settings of the polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
	/// Depth below the head after which events count as confirmed.
	pub confirmations: u64,
	/// Delay between two polls.
	pub poll_interval: Duration,
	/// Largest block range requested in a single `eth_getLogs` call.
	pub max_block_range: u64,
	/// How long to keep retrying the first connection before giving up.
	pub connect_timeout: Duration,
}

impl Default for PollConfig {
	fn default() -> Self {
		Self {
			confirmations: 5,
			poll_interval: Duration::from_secs(1),
			max_block_range: 5_000,
			connect_timeout: Duration::from_secs(30),
		}
	}
}

/// The node calls the polling loop needs.
#[async_trait::async_trait]
pub trait LedgerRpc: Send + Sync {
	async fn block_number(&self) -> Result<u64, LedgerError>;

	async fn get_logs(
		&self,
		from_block: u64,
		to_block: u64,
		topics: &[String],
	) -> Result<Vec<RpcLog>, LedgerError>;
}

/// Minimal JSON-RPC client
#[derive(Clone)]
pub struct RpcClient {
	http_client: Client,
	rpc_url: String,
}

impl RpcClient {
	pub fn new(rpc_url: String) -> Result<Self, LedgerError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
		Ok(Self {
			http_client,
			rpc_url,
		})
	}

	pub async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<T, LedgerError> {
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": method,
			"params": params,
		});

		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?
			.error_for_status()?;

		let mut response_json: serde_json::Value = response.json().await?;

		if let Some(error) = response_json.get("error") {
			return Err(LedgerError::RpcError {
				code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
				message: error
					.get("message")
					.and_then(|m| m.as_str())
					.unwrap_or("unknown error")
					.to_string(),
			});
		}

		let result = response_json
			.get_mut("result")
			.map(serde_json::Value::take)
			.ok_or_else(|| LedgerError::DecodeError(format!("{} returned no result", method)))?;
		Ok(serde_json::from_value(result)?)
	}
}

#[async_trait::async_trait]
impl LedgerRpc for RpcClient {
	async fn block_number(&self) -> Result<u64, LedgerError> {
		let quantity: String = self.call("eth_blockNumber", json!([])).await?;
		parse_quantity(&quantity)
	}

	async fn get_logs(
		&self,
		from_block: u64,
		to_block: u64,
		topics: &[String],
	) -> Result<Vec<RpcLog>, LedgerError> {
		let filter = json!({
			"fromBlock": format_quantity(from_block),
			"toBlock": format_quantity(to_block),
			"topics": [topics],
		});
		self.call("eth_getLogs", json!([filter])).await
	}
}

/// Ledger event source backed by a JSON-RPC node.
pub struct JsonRpcEventSource {
	rpc: Arc<dyn LedgerRpc>,
	registry_address: Option<Address>,
	config: PollConfig,
	subscriptions: HashSet<(EventKind, EventTier)>,
	resume_height: u64,
	stop_tx: Option<watch::Sender<bool>>,
	task: Option<JoinHandle<()>>,
}

impl JsonRpcEventSource {
	/// Create a source for `rpc_url`.
	///
	/// `TokenNetworkCreated` logs are only accepted from `registry_address`.
	pub fn new(
		rpc_url: String,
		registry_address: Option<Address>,
		config: PollConfig,
	) -> Result<Self, LedgerError> {
		let rpc = RpcClient::new(rpc_url)?;
		Ok(Self::with_rpc(Arc::new(rpc), registry_address, config))
	}

	pub fn with_rpc(
		rpc: Arc<dyn LedgerRpc>,
		registry_address: Option<Address>,
		config: PollConfig,
	) -> Self {
		Self {
			rpc,
			registry_address,
			config,
			subscriptions: HashSet::new(),
			resume_height: 0,
			stop_tx: None,
			task: None,
		}
	}

	async fn connect(&self) -> Result<u64, LedgerError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.config.connect_timeout),
			..ExponentialBackoff::default()
		};

		retry(policy, || async {
			self.rpc.block_number().await.map_err(|e| {
				warn!("Ledger not reachable yet: {}", e);
				backoff::Error::transient(e)
			})
		})
		.await
		.map_err(|e| LedgerError::Unreachable(e.to_string()))
	}
}

#[async_trait::async_trait]
impl LedgerEventSource for JsonRpcEventSource {
	fn subscribe(&mut self, kind: EventKind, tier: EventTier) {
		self.subscriptions.insert((kind, tier));
	}

	fn resume_height(&self) -> u64 {
		self.resume_height
	}

	fn set_resume_height(&mut self, height: u64) {
		self.resume_height = height;
	}

	async fn start(&mut self, sink: mpsc::Sender<SourceUpdate>) -> Result<(), LedgerError> {
		if self.task.is_some() {
			return Err(LedgerError::SourceError("source already started".to_string()));
		}

		let head = self.connect().await?;
		info!(
			"Connected to ledger at block {}, resuming confirmed events from block {}",
			head, self.resume_height
		);

		let (stop_tx, stop_rx) = watch::channel(false);
		let poller = LogPoller::new(
			self.rpc.clone(),
			self.registry_address,
			self.config.clone(),
			self.subscriptions.clone(),
			self.resume_height,
			head,
			sink,
		);

		self.task = Some(tokio::spawn(poller.run(stop_rx)));
		self.stop_tx = Some(stop_tx);
		Ok(())
	}

	async fn stop(&mut self) -> Result<(), LedgerError> {
		if let Some(stop_tx) = self.stop_tx.take() {
			stop_tx.send_replace(true);
		}
		if let Some(task) = self.task.take() {
			task.await
				.map_err(|e| LedgerError::SourceError(format!("poll task failed: {}", e)))?;
			info!("Ledger event source stopped");
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"JsonRpcEventSource"
	}
}

/// State of the polling task.
struct LogPoller {
	rpc: Arc<dyn LedgerRpc>,
	registry_address: Option<Address>,
	config: PollConfig,
	subscriptions: HashSet<(EventKind, EventTier)>,
	next_confirmed: u64,
	next_tentative: u64,
	sink: mpsc::Sender<SourceUpdate>,
}

impl LogPoller {
	/// Confirmed delivery starts at `resume_height`, tentative delivery just above the confirmed
	/// head as of `head`.
	fn new(
		rpc: Arc<dyn LedgerRpc>,
		registry_address: Option<Address>,
		config: PollConfig,
		subscriptions: HashSet<(EventKind, EventTier)>,
		resume_height: u64,
		head: u64,
		sink: mpsc::Sender<SourceUpdate>,
	) -> Self {
		let confirmed_head = head.saturating_sub(config.confirmations);
		Self {
			rpc,
			registry_address,
			config,
			subscriptions,
			next_confirmed: resume_height,
			next_tentative: resume_height.max(confirmed_head + 1),
			sink,
		}
	}

	async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
		loop {
			if *stop_rx.borrow_and_update() {
				break;
			}

			tokio::select! {
				biased;
				_ = stop_rx.changed() => break,
				result = self.poll_once() => match result {
					Ok(ControlFlow::Continue(())) => {}
					Ok(ControlFlow::Break(())) => {
						debug!("Update sink closed, ending poll loop");
						break;
					}
					Err(e) => warn!("Polling ledger failed, retrying next tick: {}", e),
				},
			}

			tokio::select! {
				biased;
				_ = stop_rx.changed() => break,
				_ = tokio::time::sleep(self.config.poll_interval) => {}
			}
		}
	}

	fn topics_for(&self, tier: EventTier) -> Vec<String> {
		EventKind::ALL
			.into_iter()
			.filter(|kind| self.subscriptions.contains(&(*kind, tier)))
			.map(topic_hex)
			.collect()
	}

	/// Fetch everything new since the last poll. Breaks once the sink is gone.
	async fn poll_once(&mut self) -> Result<ControlFlow<()>, LedgerError> {
		let head = self.rpc.block_number().await?;
		let confirmed_head = head.saturating_sub(self.config.confirmations);
		let range = self.config.max_block_range.max(1);

		let confirmed_topics = self.topics_for(EventTier::Confirmed);
		while self.next_confirmed <= confirmed_head {
			let to_block = confirmed_head.min(self.next_confirmed + range - 1);
			if !confirmed_topics.is_empty() {
				let logs = self
					.rpc
					.get_logs(self.next_confirmed, to_block, &confirmed_topics)
					.await?;
				if self.forward(logs, EventTier::Confirmed).await.is_break() {
					return Ok(ControlFlow::Break(()));
				}
			}
			if self.sink.send(SourceUpdate::BlockConfirmed(to_block)).await.is_err() {
				return Ok(ControlFlow::Break(()));
			}
			self.next_confirmed = to_block + 1;
		}

		let tentative_topics = self.topics_for(EventTier::Tentative);
		if !tentative_topics.is_empty() && self.next_tentative <= head {
			let from_block = self.next_tentative.max(head.saturating_sub(range - 1));
			if from_block > self.next_tentative {
				debug!(
					"Tentative backlog exceeds {} blocks, skipping tentative blocks {} to {}",
					range,
					self.next_tentative,
					from_block - 1
				);
			}
			let logs = self.rpc.get_logs(from_block, head, &tentative_topics).await?;
			if self.forward(logs, EventTier::Tentative).await.is_break() {
				return Ok(ControlFlow::Break(()));
			}
			self.next_tentative = head + 1;
		}

		Ok(ControlFlow::Continue(()))
	}

	async fn forward(&self, mut logs: Vec<RpcLog>, tier: EventTier) -> ControlFlow<()> {
		logs.retain(|log| !log.removed);
		let mut envelopes = Vec::with_capacity(logs.len());
		for log in &logs {
			match decode_log(log, tier) {
				Ok(Some(envelope)) => envelopes.push(envelope),
				Ok(None) => {}
				Err(e) => warn!("Skipping undecodable {} log from {}: {}", tier, log.address, e),
			}
		}
		envelopes.sort_by_key(|envelope| (envelope.block_number, envelope.log_index));

		for envelope in envelopes {
			if let LedgerEvent::TokenNetworkCreated { .. } = envelope.event {
				if Some(envelope.emitter) != self.registry_address {
					debug!(
						"Ignoring TokenNetworkCreated emitted by {}, not the followed registry",
						envelope.emitter
					);
					continue;
				}
			}
			if !self.subscriptions.contains(&(envelope.event.kind(), tier)) {
				continue;
			}
			if self.sink.send(SourceUpdate::Event(envelope)).await.is_err() {
				return ControlFlow::Break(());
			}
		}
		ControlFlow::Continue(())
	}
}
