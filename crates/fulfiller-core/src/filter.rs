//! Viability filtering for polled intents.
//!
//! Each intent runs through the rejection predicates in a fixed order; the
//! first match rejects and logs the reason. A chain-client failure (for
//! instance a balance fetch) rejects that intent for this tick only and
//! never fails the batch.

use crate::breaker::CircuitBreaker;
use alloy_primitives::{Address, U256};
use chrono::Utc;
use fulfiller_chains::ChainInterface;
use fulfiller_types::{normalize_amount, token_address, token_type_for_address, Intent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Only intents younger than this are worth attempting; anything older has
/// either been fulfilled elsewhere or gone stale with its quote.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(2 * 60);

/// Filters polled intents down to the viable set.
pub struct IntentFilter {
	chains: Arc<HashMap<u64, Arc<dyn ChainInterface>>>,
	breakers: Arc<HashMap<u64, CircuitBreaker>>,
	fulfiller_address: Address,
}

impl IntentFilter {
	pub fn new(
		chains: Arc<HashMap<u64, Arc<dyn ChainInterface>>>,
		breakers: Arc<HashMap<u64, CircuitBreaker>>,
		fulfiller_address: Address,
	) -> Self {
		Self {
			chains,
			breakers,
			fulfiller_address,
		}
	}

	/// Returns the viable intents, preserving input order.
	pub async fn filter(&self, intents: Vec<Intent>) -> Vec<Intent> {
		let mut viable = Vec::new();
		for intent in intents {
			if self.is_viable(&intent).await {
				viable.push(intent);
			}
		}
		viable
	}

	async fn is_viable(&self, intent: &Intent) -> bool {
		let id = intent.id.as_str();
		let destination = intent.destination_chain;

		if let Some(breaker) = self.breakers.get(&destination) {
			if breaker.is_open() {
				tracing::info!(
					intent_id = %id,
					chain_id = destination,
					"Skipping intent: circuit breaker is open"
				);
				return false;
			}
		}

		if intent.source_chain == intent.destination_chain {
			tracing::info!(
				intent_id = %id,
				chain_id = intent.source_chain,
				"Skipping intent: source and destination chains are the same"
			);
			return false;
		}

		let age = Utc::now().signed_duration_since(intent.created_at);
		if age.to_std().map_or(false, |age| age > FRESHNESS_WINDOW) {
			tracing::info!(intent_id = %id, age = %age, "Skipping intent: too old");
			return false;
		}

		if !self.has_sufficient_balance(intent).await {
			tracing::info!(
				intent_id = %id,
				chain_id = destination,
				"Skipping intent: insufficient token balance"
			);
			return false;
		}

		let Ok(fee) = intent.intent_fee.parse::<U256>() else {
			tracing::info!(intent_id = %id, fee = %intent.intent_fee, "Skipping intent: invalid fee");
			return false;
		};
		if fee.is_zero() {
			tracing::info!(intent_id = %id, "Skipping intent: fee is zero");
			return false;
		}

		let Some(client) = self.chains.get(&destination) else {
			tracing::info!(
				intent_id = %id,
				chain_id = destination,
				"Skipping intent: chain configuration not found"
			);
			return false;
		};

		let adjusted_fee = normalize_amount(fee, intent.source_chain, destination);
		if adjusted_fee < client.min_fee() {
			tracing::info!(
				intent_id = %id,
				fee = %adjusted_fee,
				min_fee = %client.min_fee(),
				chain_id = destination,
				"Skipping intent: fee below minimum"
			);
			return false;
		}

		true
	}

	/// Whether the fulfiller wallet holds enough of the intent's token on
	/// the destination chain.
	async fn has_sufficient_balance(&self, intent: &Intent) -> bool {
		let Ok(token) = intent.token.parse::<Address>() else {
			tracing::warn!(token = %intent.token, "Invalid token address on intent");
			return false;
		};
		let Some(token_type) = token_type_for_address(token) else {
			tracing::warn!(token = %token, "Unknown token type");
			return false;
		};
		let Some(destination_token) = token_address(intent.destination_chain, token_type) else {
			tracing::warn!(
				token_type = %token_type,
				chain_id = intent.destination_chain,
				"Token not configured for chain"
			);
			return false;
		};
		let Some(client) = self.chains.get(&intent.destination_chain) else {
			return false;
		};

		let Ok(amount) = intent.amount.parse::<U256>() else {
			tracing::warn!(amount = %intent.amount, "Invalid amount on intent");
			return false;
		};
		let required = normalize_amount(amount, intent.source_chain, intent.destination_chain);

		match client
			.erc20_balance(destination_token, self.fulfiller_address)
			.await
		{
			Ok(balance) => balance >= required,
			Err(e) => {
				tracing::warn!(
					chain_id = intent.destination_chain,
					error = %e,
					"Error getting token balance"
				);
				false
			},
		}
	}
}
