//! Intent model as served by the intents API.
//!
//! Intents are the unit of work for the fulfiller: a request to move ERC-20
//! value from a source chain to a destination chain for a posted fee. The
//! identifier is an opaque 32-byte hash, hex-encoded, and is preserved
//! verbatim when submitted on chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An intent fetched from the upstream API.
///
/// `amount` and `intent_fee` are decimal strings in the source chain's base
/// units; both are parsed lazily so that malformed values reject a single
/// intent instead of failing a whole poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
	pub id: String,
	pub source_chain: u64,
	pub destination_chain: u64,
	pub token: String,
	pub amount: String,
	pub recipient: String,
	pub intent_fee: String,
	#[serde(default)]
	pub status: String,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
}

/// A unit of work on the pending-job queue.
///
/// The retry depth is carried as a first-class field; intent ids are never
/// mutated to encode it.
#[derive(Debug, Clone)]
pub struct PendingJob {
	pub intent: Intent,
	pub retry_count: u32,
}

impl PendingJob {
	/// Wraps a freshly polled intent with a zero retry count.
	pub fn fresh(intent: Intent) -> Self {
		Self {
			intent,
			retry_count: 0,
		}
	}
}
