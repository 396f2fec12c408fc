//! Error-kind classification for fulfillment failures.
//!
//! The EVM ecosystem surfaces most failure modes as error strings, so the
//! classifier matches on stable substrings of the RPC/contract message.
//! Everything downstream branches on [`ErrorKind`], never on the string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified failure kind for a fulfillment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// The contract reports the intent as already settled or fulfilled.
	/// Another fulfiller won the race, or a prior attempt succeeded but the
	/// receipt was lost. Treated as success.
	AlreadyProcessed,
	/// Transport-level failure talking to the RPC endpoint.
	Network,
	/// RPC node served inconsistent or missing state.
	NodeState,
	/// Gas pricing or gas budget failure.
	Gas,
	/// Nonce mismatch with the chain.
	Nonce,
	/// The fulfiller wallet lacks funds for the transfer.
	InsufficientFunds,
	/// The contract reverted.
	Contract,
	/// Anything else.
	Unknown,
}

impl ErrorKind {
	/// Label used on metrics and in logs.
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::AlreadyProcessed => "already_processed",
			ErrorKind::Network => "network_error",
			ErrorKind::NodeState => "node_state_error",
			ErrorKind::Gas => "gas_error",
			ErrorKind::Nonce => "nonce_error",
			ErrorKind::InsufficientFunds => "insufficient_funds",
			ErrorKind::Contract => "contract_error",
			ErrorKind::Unknown => "unknown_error",
		}
	}

	/// Whether an attempt with this failure kind should be re-queued.
	pub fn is_retryable(&self) -> bool {
		match self {
			ErrorKind::Network
			| ErrorKind::NodeState
			| ErrorKind::Gas
			| ErrorKind::Nonce
			| ErrorKind::Unknown => true,
			ErrorKind::AlreadyProcessed | ErrorKind::InsufficientFunds | ErrorKind::Contract => {
				false
			},
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Classifies an error message by substring.
///
/// Match order matters: the idempotency markers are checked first so that a
/// revert carrying "Intent already fulfilled" is not misread as a contract
/// error.
pub fn classify_message(message: &str) -> ErrorKind {
	const ALREADY_PROCESSED: &[&str] = &[
		"Intent already settled",
		"Intent already fulfilled",
		"already fulfilled with these parameters",
	];
	const NETWORK: &[&str] = &[
		"connection refused",
		"timeout",
		"context deadline exceeded",
		"timed out",
		"no response",
		"EOF",
	];
	const NODE_STATE: &[&str] = &[
		"missing trie node",
		"layer stale",
		"getDeleteStateObject",
		"state inconsistency",
		"receipt not found",
		"block not found",
	];
	const GAS: &[&str] = &[
		"gas required exceeds allowance",
		"insufficient funds for gas",
		"gas price too low",
	];
	const NONCE: &[&str] = &[
		"nonce too low",
		"nonce too high",
		"replacement transaction underpriced",
	];
	const INSUFFICIENT_FUNDS: &[&str] = &["insufficient balance", "insufficient funds"];
	const CONTRACT: &[&str] = &["execution reverted"];

	let contains_any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

	if contains_any(ALREADY_PROCESSED) {
		ErrorKind::AlreadyProcessed
	} else if contains_any(NETWORK) {
		ErrorKind::Network
	} else if contains_any(NODE_STATE) {
		ErrorKind::NodeState
	} else if contains_any(GAS) {
		ErrorKind::Gas
	} else if contains_any(NONCE) {
		ErrorKind::Nonce
	} else if contains_any(INSUFFICIENT_FUNDS) {
		ErrorKind::InsufficientFunds
	} else if contains_any(CONTRACT) {
		ErrorKind::Contract
	} else {
		ErrorKind::Unknown
	}
}
