//! Fulfillment error type and its mapping onto error kinds.

use alloy_primitives::U256;
use fulfiller_chains::ChainError;
use fulfiller_types::{classify_message, ErrorKind};
use thiserror::Error;

/// Errors surfaced by a single fulfillment attempt.
///
/// Chain-level errors keep their RPC message so the substring classifier can
/// see it; locally detected conditions get typed variants.
#[derive(Debug, Error)]
pub enum FulfillError {
	#[error("destination chain configuration not found for: {0}")]
	ChainNotConfigured(u64),
	#[error("token address not configured for chain: {0}")]
	TokenNotConfigured(u64),
	#[error("invalid token address: {0}")]
	InvalidTokenAddress(String),
	#[error("invalid amount: {0}")]
	InvalidAmount(String),
	#[error("invalid intent id: {0}")]
	InvalidIntentId(String),
	#[error("invalid recipient: {0}")]
	InvalidRecipient(String),
	#[error("gas price {price} exceeds maximum {ceiling} on chain {chain_id}")]
	GasPriceExceeded {
		chain_id: u64,
		price: U256,
		ceiling: U256,
	},
	#[error("approve transaction failed on chain {0}")]
	ApproveFailed(u64),
	#[error("fulfill transaction failed on chain {0}")]
	TransactionFailed(u64),
	#[error(transparent)]
	Chain(#[from] ChainError),
}

impl FulfillError {
	/// Classified kind of this error. Typed variants map directly; the rest
	/// go through the substring table.
	pub fn kind(&self) -> ErrorKind {
		match self {
			FulfillError::GasPriceExceeded { .. } => ErrorKind::Gas,
			other => classify_message(&other.to_string()),
		}
	}
}
