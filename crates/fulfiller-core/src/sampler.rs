//! Periodic metrics sampling.
//!
//! Every pass publishes per-chain token balances in human units, the
//! current gas price in gwei, and the retry-queue depth, and scans for
//! transactions the nonce manager should consider timed out. Sampling
//! failures are logged and skipped; they never surface.

use fulfiller_chains::{ChainInterface, NonceManager};
use fulfiller_monitoring as metrics;
use fulfiller_types::{display_units, token_address, token_decimals, TokenType};
use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(15);
const GWEI: f64 = 1e9;

/// Periodic sampler of balances, gas prices and queue depth.
pub(crate) struct MetricsSampler {
	pub chains: Arc<HashMap<u64, Arc<dyn ChainInterface>>>,
	pub nonce_manager: Arc<NonceManager>,
	pub fulfiller_address: Address,
	pub retry_queue_depth: Arc<AtomicUsize>,
}

impl MetricsSampler {
	pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
		loop {
			tokio::select! {
				_ = ticker.tick() => self.sample().await,
				_ = shutdown.changed() => {
					tracing::info!("Metrics sampler shutting down");
					return;
				}
			}
		}
	}

	async fn sample(&self) {
		for (chain_id, client) in self.chains.iter() {
			let chain_name = client.name();

			for token in fulfiller_types::tokens::TOKEN_TYPES {
				self.sample_balance(*chain_id, client.as_ref(), &chain_name, token)
					.await;
			}

			let gwei = u128::try_from(client.current_gas_price()).unwrap_or(u128::MAX) as f64 / GWEI;
			metrics::GAS_PRICE
				.with_label_values(&[chain_id.to_string().as_str()])
				.set(gwei);

			let timed_out = self.nonce_manager.find_timed_out(*chain_id).await;
			if !timed_out.is_empty() {
				tracing::warn!(
					chain_id,
					nonces = ?timed_out,
					"Transactions exceeded the confirmation timeout"
				);
			}
		}

		metrics::RETRY_QUEUE_SIZE.set(self.retry_queue_depth.load(Ordering::SeqCst) as f64);
	}

	async fn sample_balance(
		&self,
		chain_id: u64,
		client: &dyn ChainInterface,
		chain_name: &str,
		token: TokenType,
	) {
		let Some(address) = token_address(chain_id, token) else {
			return;
		};
		let balance = match client.erc20_balance(address, self.fulfiller_address).await {
			Ok(balance) => balance,
			Err(e) => {
				tracing::debug!(chain_id, token = %token, error = %e, "Error getting token balance");
				return;
			},
		};
		// The static table is the fallback when the contract read fails.
		let decimals = match client.erc20_decimals(address).await {
			Ok(decimals) => decimals,
			Err(_) => token_decimals(chain_id, token),
		};
		metrics::TOKEN_BALANCE
			.with_label_values(&[chain_name, token.as_str()])
			.set(display_units(balance, decimals));
	}
}
