//! Worker pool consuming the pending-job queue.
//!
//! Workers are peers sharing one receiver. Each job gets a single
//! fulfillment attempt; the outcome is classified and either counted as
//! success, handed to the retry scheduler, or recorded as permanent.

use crate::breaker::CircuitBreaker;
use crate::engine::FulfillmentEngine;
use crate::retry::{backoff_for, RetryJob};
use fulfiller_monitoring as metrics;
use fulfiller_types::{ErrorKind, PendingJob};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// Shared state handed to every worker.
pub(crate) struct WorkerContext {
	pub engine: FulfillmentEngine,
	pub breakers: Arc<HashMap<u64, CircuitBreaker>>,
	pub retry_tx: mpsc::Sender<RetryJob>,
	pub max_retries: u32,
	pub in_flight: Arc<AtomicI64>,
}

/// Runs one worker until the pending-job channel closes.
pub(crate) async fn run_worker(
	id: usize,
	jobs: Arc<Mutex<mpsc::Receiver<PendingJob>>>,
	ctx: Arc<WorkerContext>,
) {
	tracing::info!(worker = id, "Starting worker");
	loop {
		let job = {
			let mut rx = jobs.lock().await;
			rx.recv().await
		};
		let Some(job) = job else {
			tracing::info!(worker = id, "Worker shutting down: channel closed");
			return;
		};
		process_job(id, &ctx, job).await;
		ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
	}
}

async fn process_job(worker_id: usize, ctx: &WorkerContext, job: PendingJob) {
	let intent = &job.intent;
	let chain_id = intent.destination_chain;
	let chain_label = chain_id.to_string();

	// An intent that slipped in through the retry path while the breaker
	// opened is dropped here; the filter will see it again next poll.
	if let Some(breaker) = ctx.breakers.get(&chain_id) {
		if breaker.is_enabled() && breaker.is_open() {
			let state = breaker.snapshot();
			tracing::info!(
				worker = worker_id,
				intent_id = %intent.id,
				chain_id,
				failure_count = state.failure_count,
				"Circuit breaker open, skipping intent"
			);
			return;
		}
	}

	tracing::info!(
		worker = worker_id,
		intent_id = %intent.id,
		source_chain = intent.source_chain,
		chain_id,
		amount = %intent.amount,
		"Processing intent"
	);

	let started = Instant::now();
	let result = ctx.engine.fulfill_intent(intent).await;
	metrics::INTENT_PROCESSING_TIME
		.with_label_values(&[chain_label.as_str()])
		.observe(started.elapsed().as_secs_f64());

	let err = match result {
		Ok(()) => {
			tracing::info!(worker = worker_id, intent_id = %intent.id, "Successfully fulfilled intent");
			metrics::INTENTS_FULFILLED
				.with_label_values(&[chain_label.as_str(), "success"])
				.inc();
			return;
		},
		Err(err) => err,
	};

	let kind = err.kind();
	tracing::error!(
		worker = worker_id,
		intent_id = %intent.id,
		error = %err,
		error_type = %kind,
		retryable = kind.is_retryable(),
		"Error fulfilling intent"
	);
	metrics::FULFILLMENT_ERRORS
		.with_label_values(&[chain_label.as_str(), kind.as_str()])
		.inc();

	// The contract already considers it settled, so it is a success from
	// our side.
	if kind == ErrorKind::AlreadyProcessed {
		tracing::info!(
			intent_id = %intent.id,
			"Intent is already settled or fulfilled, marking as success"
		);
		metrics::INTENTS_FULFILLED
			.with_label_values(&[chain_label.as_str(), "success"])
			.inc();
		return;
	}

	let tripped = match ctx.breakers.get(&chain_id) {
		Some(breaker) => {
			let tripped = breaker.record_failure();
			let state = breaker.snapshot();
			if tripped {
				tracing::warn!(
					chain_id,
					failures = state.failure_count,
					"Circuit breaker tripped"
				);
			} else {
				tracing::debug!(
					chain_id,
					failures = state.failure_count,
					threshold = state.threshold,
					"Recorded breaker failure"
				);
			}
			tripped
		},
		None => false,
	};

	metrics::INTENTS_FULFILLED
		.with_label_values(&[chain_label.as_str(), "failed"])
		.inc();

	if kind.is_retryable() && !tripped {
		schedule_retry(ctx, job, kind).await;
	} else if !kind.is_retryable() {
		tracing::info!(
			intent_id = %intent.id,
			error_type = %kind,
			"Not retrying intent due to permanent error"
		);
		metrics::PERMANENT_ERRORS
			.with_label_values(&[chain_label.as_str(), kind.as_str()])
			.inc();
	} else {
		tracing::info!(
			intent_id = %intent.id,
			"Skipping retry due to tripped circuit breaker"
		);
	}
}

/// Hands a failed job to the retry scheduler, honoring the configured retry
/// cap and the backoff schedule.
async fn schedule_retry(ctx: &WorkerContext, job: PendingJob, kind: ErrorKind) {
	let chain_label = job.intent.destination_chain.to_string();

	if job.retry_count >= ctx.max_retries {
		tracing::warn!(
			intent_id = %job.intent.id,
			retries = job.retry_count,
			error_type = %kind,
			"Max retries reached, giving up"
		);
		metrics::MAX_RETRIES_REACHED
			.with_label_values(&[chain_label.as_str(), kind.as_str()])
			.inc();
		return;
	}

	let backoff = backoff_for(job.retry_count);
	let retry_job = RetryJob {
		intent: job.intent,
		retry_count: job.retry_count + 1,
		next_attempt: Instant::now() + backoff,
		error_kind: kind,
	};

	metrics::RETRY_COUNT
		.with_label_values(&[chain_label.as_str()])
		.inc();
	tracing::info!(
		intent_id = %retry_job.intent.id,
		backoff = ?backoff,
		error_type = %kind,
		"Scheduling retry"
	);

	if let Err(e) = ctx.retry_tx.try_send(retry_job) {
		let job = match e {
			mpsc::error::TrySendError::Full(job) | mpsc::error::TrySendError::Closed(job) => job,
		};
		tracing::warn!(
			intent_id = %job.intent.id,
			"Retry channel unavailable, dropping retry job"
		);
		metrics::DROPPED_RETRIES
			.with_label_values(&[chain_label.as_str()])
			.inc();
	}
}
