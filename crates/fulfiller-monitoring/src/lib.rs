//! Prometheus metrics for the intent fulfiller.
//!
//! All metrics live in the default registry as process-wide statics; handles
//! are safe for concurrent use. Label conventions: `chain_id` is the decimal
//! destination chain id, `chain_name` the human-readable name, `error_type`
//! the classified error label.

use once_cell::sync::Lazy;
use prometheus::{
	exponential_buckets, register_gauge, register_gauge_vec, register_histogram_vec,
	register_int_counter_vec, Gauge, GaugeVec, HistogramVec, IntCounterVec, TextEncoder,
};

/// Total fulfilled intents, labelled `{chain_id, status}` with status
/// `success` or `failed`.
pub static INTENTS_FULFILLED: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_intents_fulfilled_total",
		"The total number of fulfilled intents",
		&["chain_id", "status"]
	)
	.expect("register fulfiller_intents_fulfilled_total")
});

/// Wall-time of a fulfillment attempt in seconds.
pub static INTENT_PROCESSING_TIME: Lazy<HistogramVec> = Lazy::new(|| {
	register_histogram_vec!(
		"fulfiller_intent_processing_seconds",
		"Time taken to process intents",
		&["chain_id"],
		exponential_buckets(1.0, 2.0, 10).expect("processing time buckets")
	)
	.expect("register fulfiller_intent_processing_seconds")
});

/// Gas used by approval and fulfill transactions.
pub static GAS_USED: Lazy<HistogramVec> = Lazy::new(|| {
	register_histogram_vec!(
		"fulfiller_gas_used",
		"Gas used for fulfilling intents",
		&["chain_id"],
		exponential_buckets(21000.0, 2.0, 10).expect("gas used buckets")
	)
	.expect("register fulfiller_gas_used")
});

/// Current gas price in gwei per chain.
pub static GAS_PRICE: Lazy<GaugeVec> = Lazy::new(|| {
	register_gauge_vec!(
		"fulfiller_gas_price_gwei",
		"Current gas price in gwei",
		&["chain_id"]
	)
	.expect("register fulfiller_gas_price_gwei")
});

/// Viable intents seen on the latest poll tick.
pub static PENDING_INTENTS: Lazy<Gauge> = Lazy::new(|| {
	register_gauge!(
		"fulfiller_pending_intents",
		"Number of intents pending fulfillment"
	)
	.expect("register fulfiller_pending_intents")
});

/// Retry attempts scheduled.
pub static RETRY_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_retry_count_total",
		"Total number of retry attempts",
		&["chain_id"]
	)
	.expect("register fulfiller_retry_count_total")
});

/// Classified fulfillment errors.
pub static FULFILLMENT_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_errors_total",
		"Total number of errors by type",
		&["chain_id", "error_type"]
	)
	.expect("register fulfiller_errors_total")
});

/// Errors that will not be retried.
pub static PERMANENT_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_permanent_errors_total",
		"Total number of permanent errors that won't be retried",
		&["chain_id", "error_type"]
	)
	.expect("register fulfiller_permanent_errors_total")
});

/// Token balances per chain and token type, in human units.
pub static TOKEN_BALANCE: Lazy<GaugeVec> = Lazy::new(|| {
	register_gauge_vec!(
		"fulfiller_token_balance",
		"Token balance for each chain and token type",
		&["chain_name", "token_type"]
	)
	.expect("register fulfiller_token_balance")
});

/// Intents dropped after exhausting their retry budget.
pub static MAX_RETRIES_REACHED: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_max_retries_reached_total",
		"Number of intents that reached maximum retry attempts",
		&["chain_id", "error_type"]
	)
	.expect("register fulfiller_max_retries_reached_total")
});

/// Current depth of the retry queue.
pub static RETRY_QUEUE_SIZE: Lazy<Gauge> = Lazy::new(|| {
	register_gauge!(
		"fulfiller_retry_queue_size",
		"Current size of the retry queue"
	)
	.expect("register fulfiller_retry_queue_size")
});

/// Seconds until the next scheduled retry.
pub static NEXT_RETRY_IN: Lazy<Gauge> = Lazy::new(|| {
	register_gauge!(
		"fulfiller_next_retry_seconds",
		"Seconds until the next scheduled retry"
	)
	.expect("register fulfiller_next_retry_seconds")
});

/// Retries dispatched back onto the pending queue.
pub static RETRIES_EXECUTED: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_retries_executed_total",
		"Number of retries that were executed",
		&["chain_id", "error_type"]
	)
	.expect("register fulfiller_retries_executed_total")
});

/// Retries held back or discarded, labelled with the reason.
pub static RETRIES_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_retries_skipped_total",
		"Number of retries that were skipped",
		&["chain_id", "reason"]
	)
	.expect("register fulfiller_retries_skipped_total")
});

/// Retry jobs dropped because the queue was full.
pub static DROPPED_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
	register_int_counter_vec!(
		"fulfiller_retries_dropped_total",
		"Number of retries that were dropped due to queue capacity",
		&["chain_id"]
	)
	.expect("register fulfiller_retries_dropped_total")
});

/// Renders every registered metric in the Prometheus exposition format.
pub fn gather() -> Result<String, prometheus::Error> {
	let encoder = TextEncoder::new();
	encoder.encode_to_string(&prometheus::gather())
}
