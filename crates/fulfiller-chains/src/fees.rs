//! Periodic fee refresh: gas price, native-token price, withdraw fee.
//!
//! Every chain client runs one of these loops. Each pass refreshes the gas
//! price from the RPC, resolves the native token's USD price through the
//! shared cache, derives a coarse withdraw-fee estimate, and publishes the
//! three values as one snapshot.

use crate::{price_cache, ChainClient, ChainError, ChainInterface};
use alloy_primitives::U256;
use fulfiller_types::coingecko_token_id;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cadence of the fee update loop.
pub const FEE_UPDATE_INTERVAL: Duration = Duration::from_secs(15);

const PRICE_API_BASE: &str = "https://api.coingecko.com/api/v3";
const PRICE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Gas budget assumed for a withdraw when estimating its USD cost.
const WITHDRAW_GAS_UNITS: f64 = 100_000.0;
const WEI_PER_NATIVE: f64 = 1e18;

static PRICE_HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
	reqwest::Client::builder()
		.timeout(PRICE_FETCH_TIMEOUT)
		.build()
		.unwrap_or_default()
});

/// Spawns the periodic fee update task for a client.
pub(crate) fn spawn_fee_loop(client: Arc<ChainClient>, interval: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		loop {
			ticker.tick().await;
			update_fees(&client).await;
		}
	})
}

/// One pass of the fee update.
///
/// A failure at any step leaves the previous snapshot in place; fee data is
/// advisory and the next tick will try again.
async fn update_fees(client: &ChainClient) {
	let chain_id = client.chain_id();

	let gas_price = match client.refresh_gas_price().await {
		Ok(price) => price,
		Err(e) => {
			tracing::debug!(chain_id, error = %e, "Failed to update gas price");
			return;
		},
	};

	let token_price = match fetch_native_token_price(chain_id).await {
		Ok(price) => price,
		Err(e) => {
			tracing::debug!(chain_id, error = %e, "Failed to update token price");
			return;
		},
	};

	let withdraw_fee = compute_withdraw_fee(gas_price, token_price);
	client.publish_fees(gas_price, token_price, withdraw_fee);
	tracing::trace!(
		chain_id,
		gas_price = %gas_price,
		token_price_usd = token_price,
		withdraw_fee_usd = withdraw_fee,
		"Published fee snapshot"
	);
}

/// Resolves the USD price of a chain's native token through the global
/// cache, falling back to the upstream price API on a miss.
pub async fn fetch_native_token_price(chain_id: u64) -> Result<f64, ChainError> {
	let token_id = coingecko_token_id(chain_id).ok_or_else(|| {
		ChainError::InvalidData(format!("unsupported chain id for price fetching: {chain_id}"))
	})?;

	if let Some(price) = price_cache::global().get(token_id) {
		return Ok(price);
	}

	let url = format!("{PRICE_API_BASE}/simple/price?ids={token_id}&vs_currencies=usd");
	let response = PRICE_HTTP_CLIENT
		.get(&url)
		.send()
		.await
		.map_err(|e| ChainError::Network(format!("failed to fetch token price: {e}")))?;

	if !response.status().is_success() {
		return Err(ChainError::Network(format!(
			"price API request failed with status: {}",
			response.status()
		)));
	}

	let body: HashMap<String, HashMap<String, f64>> = response
		.json()
		.await
		.map_err(|e| ChainError::InvalidData(format!("failed to parse price response: {e}")))?;

	let price = body
		.get(token_id)
		.and_then(|entry| entry.get("usd"))
		.copied()
		.ok_or_else(|| {
			ChainError::InvalidData(format!("USD price for {token_id} not found in response"))
		})?;

	price_cache::global().set(token_id, price);
	Ok(price)
}

/// Coarse withdraw-fee estimate: `gasPrice · 100000 / 10^18 · tokenPriceUSD`.
pub fn compute_withdraw_fee(gas_price: U256, token_price_usd: f64) -> f64 {
	let gas_price_wei = u128::try_from(gas_price).unwrap_or(u128::MAX) as f64;
	gas_price_wei * WITHDRAW_GAS_UNITS / WEI_PER_NATIVE * token_price_usd
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_compute_withdraw_fee() {
		// 20 gwei, ETH at $3000: 20e9 * 1e5 / 1e18 * 3000 = $6.
		let gas_price = U256::from(20_000_000_000u64);
		let fee = compute_withdraw_fee(gas_price, 3000.0);
		assert!((fee - 6.0).abs() < 1e-9);
	}

	#[test]
	fn test_compute_withdraw_fee_zero_gas() {
		assert_eq!(compute_withdraw_fee(U256::ZERO, 3000.0), 0.0);
	}

	#[tokio::test]
	async fn test_fetch_unsupported_chain_errors() {
		let err = fetch_native_token_price(31337).await.unwrap_err();
		assert!(matches!(err, ChainError::InvalidData(_)));
	}

	#[tokio::test]
	async fn test_fetch_uses_cache_before_network() {
		price_cache::clear_global();
		price_cache::global().set("zetachain", 0.42);
		let price = fetch_native_token_price(7000).await.unwrap();
		assert_eq!(price, 0.42);
		price_cache::clear_global();
	}
}
