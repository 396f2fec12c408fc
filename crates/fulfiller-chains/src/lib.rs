//! Per-chain RPC clients for the intent fulfiller.
//!
//! This crate wraps the Alloy provider stack behind the [`ChainInterface`]
//! trait so that the lifecycle engine can be exercised against mocks. A
//! [`ChainClient`] owns the connection to one chain: it signs and submits
//! transactions with explicit nonces and gas prices, answers the ERC-20 view
//! calls the filter and sampler need, and runs a background loop that keeps
//! the chain's fee triple (gas price, native-token USD price, withdraw-fee
//! estimate) fresh.

/// Contract bindings for the ERC-20 surface and the intent settler.
pub mod contracts;
/// Periodic fee refresh: gas price, native-token price, withdraw fee.
pub mod fees;
/// Per-chain nonce allocation and pending-transaction tracking.
pub mod nonce;
/// Shared TTL-bounded cache for native-token USD prices.
pub mod price_cache;

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use contracts::{IERC20, IIntent};
use fulfiller_config::ChainSettings;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

pub use nonce::{NonceManager, TxStatus};
pub use price_cache::TokenPriceCache;

/// Timeout applied to gas-price suggestions.
const GAS_PRICE_TIMEOUT: Duration = Duration::from_secs(10);
/// Receipt polling cadence.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Errors raised by chain clients.
///
/// Variants keep the underlying RPC message verbatim: the worker's error
/// classifier matches on those substrings.
#[derive(Debug, Error)]
pub enum ChainError {
	#[error("network error: {0}")]
	Network(String),
	#[error("transaction failed: {0}")]
	TransactionFailed(String),
	#[error("invalid data: {0}")]
	InvalidData(String),
}

/// Condensed transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceiptInfo {
	pub hash: B256,
	pub gas_used: u64,
	pub success: bool,
}

/// Capability set of a connected chain, the seam the engine and filter are
/// written against.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChainInterface: Send + Sync {
	fn chain_id(&self) -> u64;
	fn name(&self) -> String;
	fn intent_address(&self) -> Address;
	fn min_fee(&self) -> U256;
	fn max_gas_price(&self) -> U256;

	/// Most recent gas price (suggested price times the headroom multiplier).
	fn current_gas_price(&self) -> U256;

	/// Re-fetches the suggested gas price, applies the multiplier, publishes
	/// the result and returns it.
	async fn refresh_gas_price(&self) -> Result<U256, ChainError>;

	async fn latest_block_number(&self) -> Result<u64, ChainError>;

	/// The chain's pending-pool nonce for an address.
	async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

	async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
	async fn erc20_allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, ChainError>;
	async fn erc20_decimals(&self, token: Address) -> Result<u8, ChainError>;
	async fn erc20_symbol(&self, token: Address) -> Result<String, ChainError>;

	/// Signs and broadcasts an ERC-20 `approve`, returning the tx hash.
	async fn submit_approve(
		&self,
		token: Address,
		spender: Address,
		amount: U256,
		nonce: u64,
		gas_price: U256,
	) -> Result<B256, ChainError>;

	/// Signs and broadcasts an intent `fulfill`, returning the tx hash.
	async fn submit_fulfill(
		&self,
		intent_id: B256,
		token: Address,
		amount: U256,
		receiver: Address,
		nonce: u64,
		gas_price: U256,
	) -> Result<B256, ChainError>;

	/// Blocks until the transaction is mined, then reports its status.
	async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceiptInfo, ChainError>;
}

/// Atomically published fee triple for a chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeSnapshot {
	pub gas_price: U256,
	pub token_price_usd: f64,
	pub withdraw_fee_usd: f64,
}

/// Connected handle for a single chain.
pub struct ChainClient {
	chain_id: u64,
	name: String,
	rpc_url: String,
	intent_address: Address,
	min_fee: U256,
	max_gas_price: U256,
	gas_multiplier: f64,
	signer_address: Address,
	provider: DynProvider,
	fees: RwLock<FeeSnapshot>,
	fee_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChainClient {
	/// Dials the chain's RPC and starts the fee update loop.
	///
	/// Must be called from within a tokio runtime; the fee loop is spawned
	/// at construction and runs until [`ChainClient::stop_fee_updates`].
	pub fn connect(
		settings: &ChainSettings,
		max_gas_price: U256,
		private_key: &str,
	) -> Result<std::sync::Arc<Self>, ChainError> {
		let signer: PrivateKeySigner = private_key
			.parse()
			.map_err(|e| ChainError::InvalidData(format!("invalid private key: {e}")))?;
		let signer_address = signer.address();
		let wallet = EthereumWallet::from(signer);

		let url = settings
			.rpc_url
			.parse()
			.map_err(|e| ChainError::InvalidData(format!(
				"invalid RPC URL for chain {}: {e}",
				settings.chain_id
			)))?;
		let provider = ProviderBuilder::new()
			.wallet(wallet)
			.connect_http(url)
			.erased();

		let client = std::sync::Arc::new(Self {
			chain_id: settings.chain_id,
			name: settings.name.clone(),
			rpc_url: settings.rpc_url.clone(),
			intent_address: settings.intent_address,
			min_fee: settings.min_fee,
			max_gas_price,
			gas_multiplier: settings.gas_multiplier,
			signer_address,
			provider,
			fees: RwLock::new(FeeSnapshot::default()),
			fee_task: Mutex::new(None),
		});

		let handle = fees::spawn_fee_loop(client.clone(), fees::FEE_UPDATE_INTERVAL);
		*client
			.fee_task
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(handle);

		Ok(client)
	}

	/// Stops the background fee loop.
	pub fn stop_fee_updates(&self) {
		if let Some(handle) = self
			.fee_task
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
		{
			handle.abort();
		}
	}

	/// Address of the signing key, the owner for allowances and balances.
	pub fn signer_address(&self) -> Address {
		self.signer_address
	}

	pub fn rpc_url(&self) -> &str {
		&self.rpc_url
	}

	/// Current fee triple, read under a single lock.
	pub fn fee_snapshot(&self) -> FeeSnapshot {
		*self.fees.read().unwrap_or_else(PoisonError::into_inner)
	}

	/// Publishes the fee triple in one critical section so observers never
	/// see a half-updated set.
	pub(crate) fn publish_fees(&self, gas_price: U256, token_price_usd: f64, withdraw_fee_usd: f64) {
		let mut fees = self.fees.write().unwrap_or_else(PoisonError::into_inner);
		fees.gas_price = gas_price;
		fees.token_price_usd = token_price_usd;
		fees.withdraw_fee_usd = withdraw_fee_usd;
	}

	fn store_gas_price(&self, gas_price: U256) {
		self.fees
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.gas_price = gas_price;
	}

	async fn call_view(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>, ChainError> {
		let request = TransactionRequest::default().to(to).input(calldata.into());
		let bytes = self
			.provider
			.call(request)
			.await
			.map_err(|e| ChainError::Network(format!("eth_call failed: {e}")))?;
		Ok(bytes.to_vec())
	}

	async fn send_call(
		&self,
		to: Address,
		calldata: Vec<u8>,
		nonce: u64,
		gas_price: U256,
	) -> Result<B256, ChainError> {
		let gas_price = u128::try_from(gas_price)
			.map_err(|_| ChainError::InvalidData("gas price exceeds u128".into()))?;

		let mut request = TransactionRequest::default().to(to).input(calldata.into());
		request.from = Some(self.signer_address);
		request.nonce = Some(nonce);
		request.gas_price = Some(gas_price);

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| ChainError::Network(format!("failed to send transaction: {e}")))?;
		Ok(*pending.tx_hash())
	}
}

/// Scales a suggested gas price by the headroom multiplier using integer
/// per-mille arithmetic.
pub(crate) fn apply_multiplier(price: U256, multiplier: f64) -> U256 {
	let per_mille = (multiplier * 1000.0).round().max(0.0) as u64;
	price.saturating_mul(U256::from(per_mille)) / U256::from(1000u64)
}

#[async_trait]
impl ChainInterface for ChainClient {
	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	fn name(&self) -> String {
		self.name.clone()
	}

	fn intent_address(&self) -> Address {
		self.intent_address
	}

	fn min_fee(&self) -> U256 {
		self.min_fee
	}

	fn max_gas_price(&self) -> U256 {
		self.max_gas_price
	}

	fn current_gas_price(&self) -> U256 {
		self.fees
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.gas_price
	}

	async fn refresh_gas_price(&self) -> Result<U256, ChainError> {
		let suggested = tokio::time::timeout(GAS_PRICE_TIMEOUT, self.provider.get_gas_price())
			.await
			.map_err(|_| {
				ChainError::Network(format!(
					"gas price fetch timed out for chain {}",
					self.chain_id
				))
			})?
			.map_err(|e| ChainError::Network(format!("failed to get gas price: {e}")))?;

		let final_price = apply_multiplier(U256::from(suggested), self.gas_multiplier);
		self.store_gas_price(final_price);
		Ok(final_price)
	}

	async fn latest_block_number(&self) -> Result<u64, ChainError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| ChainError::Network(format!("failed to get block number: {e}")))
	}

	async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
		self.provider
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(|e| ChainError::Network(format!("failed to get pending nonce: {e}")))
	}

	async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
		let data = self
			.call_view(token, IERC20::balanceOfCall { owner }.abi_encode())
			.await?;
		IERC20::balanceOfCall::abi_decode_returns(&data)
			.map_err(|e| ChainError::InvalidData(format!("invalid balanceOf response: {e}")))
	}

	async fn erc20_allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, ChainError> {
		let data = self
			.call_view(token, IERC20::allowanceCall { owner, spender }.abi_encode())
			.await?;
		IERC20::allowanceCall::abi_decode_returns(&data)
			.map_err(|e| ChainError::InvalidData(format!("invalid allowance response: {e}")))
	}

	async fn erc20_decimals(&self, token: Address) -> Result<u8, ChainError> {
		let data = self
			.call_view(token, IERC20::decimalsCall {}.abi_encode())
			.await?;
		IERC20::decimalsCall::abi_decode_returns(&data)
			.map_err(|e| ChainError::InvalidData(format!("invalid decimals response: {e}")))
	}

	async fn erc20_symbol(&self, token: Address) -> Result<String, ChainError> {
		let data = self
			.call_view(token, IERC20::symbolCall {}.abi_encode())
			.await?;
		IERC20::symbolCall::abi_decode_returns(&data)
			.map_err(|e| ChainError::InvalidData(format!("invalid symbol response: {e}")))
	}

	async fn submit_approve(
		&self,
		token: Address,
		spender: Address,
		amount: U256,
		nonce: u64,
		gas_price: U256,
	) -> Result<B256, ChainError> {
		let calldata = IERC20::approveCall {
			spender,
			value: amount,
		}
		.abi_encode();
		self.send_call(token, calldata, nonce, gas_price).await
	}

	async fn submit_fulfill(
		&self,
		intent_id: B256,
		token: Address,
		amount: U256,
		receiver: Address,
		nonce: u64,
		gas_price: U256,
	) -> Result<B256, ChainError> {
		let calldata = IIntent::fulfillCall {
			intentId: intent_id,
			asset: token,
			amount,
			receiver,
		}
		.abi_encode();
		self.send_call(self.intent_address, calldata, nonce, gas_price)
			.await
	}

	async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceiptInfo, ChainError> {
		loop {
			match self.provider.get_transaction_receipt(hash).await {
				Ok(Some(receipt)) => {
					return Ok(TxReceiptInfo {
						hash,
						gas_used: receipt.gas_used,
						success: receipt.status(),
					});
				},
				// Not yet mined; keep polling. RPC-level failures surface so
				// the classifier can decide on a retry.
				Ok(None) => {},
				Err(e) => {
					return Err(ChainError::Network(format!("failed to get receipt: {e}")));
				},
			}
			tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_apply_multiplier_adds_headroom() {
		let price = U256::from(1_000_000_000u64); // 1 gwei
		assert_eq!(apply_multiplier(price, 1.1), U256::from(1_100_000_000u64));
		assert_eq!(apply_multiplier(price, 1.0), price);
		assert_eq!(apply_multiplier(price, 2.0), U256::from(2_000_000_000u64));
	}

	#[test]
	fn test_apply_multiplier_truncates_per_mille() {
		// 1.005 rounds to 1005 per mille.
		let price = U256::from(1_000u64);
		assert_eq!(apply_multiplier(price, 1.005), U256::from(1_005u64));
	}

	#[test]
	fn test_chain_error_messages_preserve_rpc_text() {
		let err = ChainError::Network("failed to send transaction: nonce too low".into());
		assert!(err.to_string().contains("nonce too low"));
	}
}
