//! Intent lifecycle engine.
//!
//! The [`FulfillerService`] drives the whole pipeline: it polls the intents
//! API, filters for viability, feeds a bounded worker pool, and owns the
//! retry scheduler, the per-chain circuit breakers and the metrics sampler.
//! Components communicate over channels; there are no back-pointers.

/// Client for the upstream intents API.
pub mod api;
/// Per destination-chain circuit breaker.
pub mod breaker;
/// Per-intent fulfillment engine.
pub mod engine;
/// Fulfillment error type.
pub mod error;
/// Viability filtering for polled intents.
pub mod filter;
/// Retry scheduling with exponential backoff.
pub mod retry;
/// Periodic metrics sampling.
mod sampler;
/// Worker pool consuming the pending-job queue.
mod worker;

use alloy_primitives::Address;
use api::{ApiClient, ApiError};
use breaker::CircuitBreaker;
use engine::FulfillmentEngine;
use filter::IntentFilter;
use fulfiller_chains::{ChainInterface, NonceManager};
use fulfiller_config::Config;
use fulfiller_monitoring as metrics;
use fulfiller_types::PendingJob;
use retry::RetryScheduler;
use sampler::MetricsSampler;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use worker::{run_worker, WorkerContext};

pub use error::FulfillError;
pub use retry::RetryJob;

/// Capacity of the pending-job channel feeding the workers.
const PENDING_QUEUE_CAPACITY: usize = 100;

/// Errors raised while building or running the service.
#[derive(Debug, Error)]
pub enum ServiceError {
	#[error(transparent)]
	Api(#[from] ApiError),
}

/// The orchestrator owning every lifecycle task.
pub struct FulfillerService {
	config: Config,
	api: Arc<ApiClient>,
	chains: Arc<HashMap<u64, Arc<dyn ChainInterface>>>,
	breakers: Arc<HashMap<u64, CircuitBreaker>>,
	nonce_manager: Arc<NonceManager>,
	fulfiller_address: Address,
}

impl FulfillerService {
	/// Builds the service around already-connected chain clients.
	///
	/// One circuit breaker is created per configured chain, all sharing the
	/// configured thresholds.
	pub fn new(
		config: Config,
		chains: HashMap<u64, Arc<dyn ChainInterface>>,
		fulfiller_address: Address,
	) -> Result<Self, ServiceError> {
		let api = Arc::new(ApiClient::new(&config.api_endpoint)?);

		let mut breakers = HashMap::new();
		for chain_id in chains.keys() {
			breakers.insert(*chain_id, CircuitBreaker::new(&config.circuit_breaker));
		}

		Ok(Self {
			config,
			api,
			chains: Arc::new(chains),
			breakers: Arc::new(breakers),
			nonce_manager: Arc::new(NonceManager::new()),
			fulfiller_address,
		})
	}

	/// The per-chain circuit breakers, shared with the operator surface.
	pub fn breakers(&self) -> Arc<HashMap<u64, CircuitBreaker>> {
		self.breakers.clone()
	}

	/// Runs the polling loop until the shutdown flag flips.
	///
	/// On shutdown the pending channel is closed, workers drain what they
	/// already accepted, and the call returns once every worker has exited.
	pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
		let (pending_tx, pending_rx) = mpsc::channel::<PendingJob>(PENDING_QUEUE_CAPACITY);
		let (retry_tx, retry_rx) = mpsc::channel::<RetryJob>(retry::MAX_RETRY_QUEUE);
		let in_flight = Arc::new(AtomicI64::new(0));
		let retry_queue_depth = Arc::new(AtomicUsize::new(0));

		let worker_ctx = Arc::new(WorkerContext {
			engine: FulfillmentEngine::new(
				self.chains.clone(),
				self.nonce_manager.clone(),
				self.fulfiller_address,
			),
			breakers: self.breakers.clone(),
			retry_tx,
			max_retries: self.config.max_retries,
			in_flight: in_flight.clone(),
		});

		tracing::info!(workers = self.config.worker_count, "Starting worker pool");
		let jobs = Arc::new(Mutex::new(pending_rx));
		let workers: Vec<_> = (0..self.config.worker_count)
			.map(|id| tokio::spawn(run_worker(id, jobs.clone(), worker_ctx.clone())))
			.collect();

		let scheduler = RetryScheduler {
			api: self.api.clone(),
			chains: self.chains.clone(),
			breakers: self.breakers.clone(),
			pending_tx: pending_tx.clone(),
			in_flight: in_flight.clone(),
			queue_depth: retry_queue_depth.clone(),
		};
		let scheduler_handle = tokio::spawn(scheduler.run(retry_rx, shutdown.clone()));

		let sampler = MetricsSampler {
			chains: self.chains.clone(),
			nonce_manager: self.nonce_manager.clone(),
			fulfiller_address: self.fulfiller_address,
			retry_queue_depth,
		};
		let sampler_handle = tokio::spawn(sampler.run(shutdown.clone()));

		tracing::info!(
			interval = ?self.config.polling_interval,
			"Starting fulfiller service polling loop"
		);
		let mut ticker = tokio::time::interval(self.config.polling_interval);
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					self.poll_once(&pending_tx, &in_flight).await;
				}
				_ = shutdown.changed() => {
					tracing::info!("Shutdown requested, stopping polling loop");
					break;
				}
			}
		}

		// Closing the channel lets workers drain and exit; the scheduler and
		// sampler react to the shutdown flag.
		drop(pending_tx);
		drop(worker_ctx);
		for handle in workers {
			let _ = handle.await;
		}
		let _ = scheduler_handle.await;
		let _ = sampler_handle.await;
		tracing::info!("Fulfiller service stopped");
	}

	/// One poll tick: fetch, filter, enqueue.
	async fn poll_once(&self, pending_tx: &mpsc::Sender<PendingJob>, in_flight: &AtomicI64) {
		let intents = match self.api.fetch_pending().await {
			Ok(intents) => intents,
			Err(e) => {
				tracing::error!(error = %e, "Error fetching intents");
				return;
			},
		};
		tracing::info!(count = intents.len(), "Found pending intents");

		let filter = IntentFilter::new(
			self.chains.clone(),
			self.breakers.clone(),
			self.fulfiller_address,
		);
		let viable = filter.filter(intents).await;
		tracing::info!(count = viable.len(), "Found viable intents for processing");
		metrics::PENDING_INTENTS.set(viable.len() as f64);

		for intent in viable {
			in_flight.fetch_add(1, Ordering::SeqCst);
			if pending_tx.send(PendingJob::fresh(intent)).await.is_err() {
				in_flight.fetch_sub(1, Ordering::SeqCst);
				return;
			}
		}
	}
}
