//! Retry scheduling with exponential backoff.
//!
//! The scheduler owns a time-ordered queue of deferred jobs. Workers push
//! failed attempts in over a bounded channel; the dispatch loop wakes when
//! the next job is due (with a 10 s ceiling), revalidates each job against
//! the API's pending set and the destination chain's breaker and gas state,
//! and re-enqueues survivors onto the pending-job channel.

use crate::api::ApiClient;
use crate::breaker::CircuitBreaker;
use fulfiller_chains::ChainInterface;
use fulfiller_monitoring as metrics;
use fulfiller_types::{ErrorKind, Intent, PendingJob};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Maximum number of queued retry jobs.
pub(crate) const MAX_RETRY_QUEUE: usize = 1000;
/// Jobs dispatched per wake, to avoid starving other work.
const MAX_JOBS_PER_WAKE: usize = 10;
/// Longest the loop sleeps between queue scans.
const WAKE_CEILING: Duration = Duration::from_secs(10);
/// Shortest re-wake when a backlog remains.
const BACKLOG_FLOOR: Duration = Duration::from_secs(1);

const BASE_BACKOFF: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(2 * 60);

/// An intent deferred for a later attempt.
#[derive(Debug, Clone)]
pub struct RetryJob {
	pub intent: Intent,
	/// Number of attempts already made; at least 1.
	pub retry_count: u32,
	pub next_attempt: Instant,
	pub error_kind: ErrorKind,
}

/// Exponential backoff for the k-th retry: `min(2^k * 10s, 2min)`.
pub fn backoff_for(retry_count: u32) -> Duration {
	let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
	BASE_BACKOFF
		.checked_mul(factor.min(u32::MAX as u64) as u32)
		.map_or(MAX_BACKOFF, |b| b.min(MAX_BACKOFF))
}

/// Heap entry ordered by `next_attempt`.
struct QueuedJob(RetryJob);

impl PartialEq for QueuedJob {
	fn eq(&self, other: &Self) -> bool {
		self.0.next_attempt == other.0.next_attempt
	}
}
impl Eq for QueuedJob {}
impl PartialOrd for QueuedJob {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for QueuedJob {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.next_attempt.cmp(&other.0.next_attempt)
	}
}

type RetryQueue = BinaryHeap<Reverse<QueuedJob>>;

/// Owns the retry queue and its dispatch loop.
pub(crate) struct RetryScheduler {
	pub api: Arc<ApiClient>,
	pub chains: Arc<HashMap<u64, Arc<dyn ChainInterface>>>,
	pub breakers: Arc<HashMap<u64, CircuitBreaker>>,
	pub pending_tx: mpsc::Sender<PendingJob>,
	pub in_flight: Arc<AtomicI64>,
	pub queue_depth: Arc<AtomicUsize>,
}

impl RetryScheduler {
	/// Runs until the retry channel closes or shutdown flips.
	pub async fn run(
		self,
		mut retry_rx: mpsc::Receiver<RetryJob>,
		mut shutdown: watch::Receiver<bool>,
	) {
		let mut queue: RetryQueue = BinaryHeap::new();
		tracing::info!("Retry scheduler started");

		loop {
			let wake = next_wake(&queue);
			tokio::select! {
				maybe_job = retry_rx.recv() => {
					match maybe_job {
						Some(job) => self.enqueue(&mut queue, job),
						None => break,
					}
				}
				_ = tokio::time::sleep_until(wake) => {
					let pending_ids = self.fetch_pending_ids().await;
					self.dispatch_due(&mut queue, pending_ids.as_ref()).await;
				}
				_ = shutdown.changed() => break,
			}
		}
		tracing::info!("Retry scheduler shutting down");
	}

	fn enqueue(&self, queue: &mut RetryQueue, job: RetryJob) {
		if queue.len() >= MAX_RETRY_QUEUE {
			tracing::warn!(
				intent_id = %job.intent.id,
				capacity = MAX_RETRY_QUEUE,
				"Retry queue at capacity, dropping retry job"
			);
			metrics::DROPPED_RETRIES
				.with_label_values(&[job.intent.destination_chain.to_string().as_str()])
				.inc();
			return;
		}
		queue.push(Reverse(QueuedJob(job)));
		self.publish_depth(queue);
	}

	/// One pass over the due jobs, capped at [`MAX_JOBS_PER_WAKE`].
	///
	/// `pending_ids` of `None` means the API fetch failed; dispatch proceeds
	/// without the still-pending check rather than stalling retries.
	async fn dispatch_due(&self, queue: &mut RetryQueue, pending_ids: Option<&HashSet<String>>) {
		let now = Instant::now();
		let mut kept = Vec::new();
		let mut processed = 0usize;

		while let Some(Reverse(head)) = queue.peek() {
			if head.0.next_attempt > now || processed >= MAX_JOBS_PER_WAKE {
				break;
			}
			let Some(Reverse(QueuedJob(job))) = queue.pop() else {
				break;
			};
			let chain_label = job.intent.destination_chain.to_string();

			if self
				.breakers
				.get(&job.intent.destination_chain)
				.is_some_and(|b| b.is_open())
			{
				metrics::RETRIES_SKIPPED
					.with_label_values(&[chain_label.as_str(), "circuit_breaker_open"])
					.inc();
				kept.push(job);
				continue;
			}

			if let Some(client) = self.chains.get(&job.intent.destination_chain) {
				let ceiling = client.max_gas_price();
				if !ceiling.is_zero() && client.current_gas_price() > ceiling {
					metrics::RETRIES_SKIPPED
						.with_label_values(&[chain_label.as_str(), "gas_price_too_high"])
						.inc();
					kept.push(job);
					continue;
				}
			}

			if let Some(pending) = pending_ids {
				if !pending.contains(&job.intent.id) {
					tracing::info!(
						intent_id = %job.intent.id,
						"Intent is no longer pending, removing from retry queue"
					);
					metrics::RETRIES_SKIPPED
						.with_label_values(&[chain_label.as_str(), "not_pending"])
						.inc();
					continue;
				}
			}

			tracing::info!(
				intent_id = %job.intent.id,
				attempt = job.retry_count,
				error_type = %job.error_kind,
				"Retrying intent"
			);
			metrics::RETRIES_EXECUTED
				.with_label_values(&[chain_label.as_str(), job.error_kind.as_str()])
				.inc();
			self.in_flight.fetch_add(1, Ordering::SeqCst);
			processed += 1;
			let pending_job = PendingJob {
				intent: job.intent,
				retry_count: job.retry_count,
			};
			if self.pending_tx.send(pending_job).await.is_err() {
				// Pending channel closed; the service is shutting down.
				self.in_flight.fetch_sub(1, Ordering::SeqCst);
				break;
			}
		}

		for job in kept {
			queue.push(Reverse(QueuedJob(job)));
		}
		self.publish_depth(queue);
	}

	async fn fetch_pending_ids(&self) -> Option<HashSet<String>> {
		match self.api.fetch_pending().await {
			Ok(intents) => Some(intents.into_iter().map(|i| i.id).collect()),
			Err(e) => {
				tracing::warn!(error = %e, "Error fetching pending intents for retry verification");
				None
			},
		}
	}

	fn publish_depth(&self, queue: &RetryQueue) {
		self.queue_depth.store(queue.len(), Ordering::SeqCst);
		metrics::RETRY_QUEUE_SIZE.set(queue.len() as f64);
		if let Some(Reverse(head)) = queue.peek() {
			let until = head
				.0
				.next_attempt
				.saturating_duration_since(Instant::now());
			metrics::NEXT_RETRY_IN.set(until.as_secs_f64());
		}
	}
}

/// Next wake-up: the head job's due time clamped to [1 s, 10 s] from now,
/// or the 10 s ceiling for an empty queue.
fn next_wake(queue: &RetryQueue) -> Instant {
	let now = Instant::now();
	match queue.peek() {
		Some(Reverse(head)) => {
			let due = head.0.next_attempt;
			let earliest = now + BACKLOG_FLOOR;
			let latest = now + WAKE_CEILING;
			due.max(earliest).min(latest)
		},
		None => now + WAKE_CEILING,
	}
}
