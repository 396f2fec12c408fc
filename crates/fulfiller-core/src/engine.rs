//! Per-intent fulfillment: gas refresh, allowance check, approval, fulfill.
//!
//! The engine performs exactly one attempt; retry decisions belong to the
//! worker and scheduler. Nonces are reserved from the shared manager, the
//! submitted hash is tracked, and the outcome marks the nonce confirmed or
//! failed so the slot is reclaimed.

use crate::error::FulfillError;
use alloy_primitives::{hex, Address, B256, U256};
use fulfiller_chains::{ChainInterface, NonceManager};
use fulfiller_monitoring as metrics;
use fulfiller_types::{normalize_amount, token_address, token_type_for_address, Intent};
use std::collections::HashMap;
use std::sync::Arc;

const GWEI: f64 = 1e9;

/// Executes single fulfillment attempts against the destination chain.
pub struct FulfillmentEngine {
	chains: Arc<HashMap<u64, Arc<dyn ChainInterface>>>,
	nonce_manager: Arc<NonceManager>,
	fulfiller_address: Address,
}

impl FulfillmentEngine {
	pub fn new(
		chains: Arc<HashMap<u64, Arc<dyn ChainInterface>>>,
		nonce_manager: Arc<NonceManager>,
		fulfiller_address: Address,
	) -> Self {
		Self {
			chains,
			nonce_manager,
			fulfiller_address,
		}
	}

	/// Attempts to fulfill one intent on its destination chain.
	pub async fn fulfill_intent(&self, intent: &Intent) -> Result<(), FulfillError> {
		let chain_id = intent.destination_chain;
		let client = self
			.chains
			.get(&chain_id)
			.ok_or(FulfillError::ChainNotConfigured(chain_id))?;

		// A transient gas-price failure falls back to the cached value; a
		// price above the ceiling is bounced to the retry scheduler.
		let gas_price = match client.refresh_gas_price().await {
			Ok(price) => {
				let gwei = u128::try_from(price).unwrap_or(u128::MAX) as f64 / GWEI;
				metrics::GAS_PRICE
					.with_label_values(&[chain_id.to_string().as_str()])
					.set(gwei);
				price
			},
			Err(e) => {
				tracing::warn!(chain_id, error = %e, "Failed to update gas price");
				client.current_gas_price()
			},
		};
		let ceiling = client.max_gas_price();
		if !ceiling.is_zero() && gas_price > ceiling {
			return Err(FulfillError::GasPriceExceeded {
				chain_id,
				price: gas_price,
				ceiling,
			});
		}

		let raw_amount: U256 = intent
			.amount
			.parse()
			.map_err(|_| FulfillError::InvalidAmount(intent.amount.clone()))?;
		let amount = normalize_amount(raw_amount, intent.source_chain, chain_id);

		let intent_id = parse_intent_id(&intent.id)?;
		let receiver: Address = intent
			.recipient
			.parse()
			.map_err(|_| FulfillError::InvalidRecipient(intent.recipient.clone()))?;

		let intent_token: Address = intent
			.token
			.parse()
			.map_err(|_| FulfillError::InvalidTokenAddress(intent.token.clone()))?;
		let token_type = token_type_for_address(intent_token)
			.ok_or(FulfillError::TokenNotConfigured(chain_id))?;
		let token = token_address(chain_id, token_type)
			.ok_or(FulfillError::TokenNotConfigured(chain_id))?;

		tracing::info!(
			intent_id = %intent.id,
			chain_id,
			amount = %amount,
			token = %token,
			"Fulfilling intent"
		);

		self.ensure_allowance(client.as_ref(), token, amount, gas_price)
			.await?;
		self.submit_fulfill(client.as_ref(), intent, intent_id, token, amount, receiver, gas_price)
			.await
	}

	/// Checks the current allowance and sets an unlimited approval when it
	/// does not cover the amount.
	async fn ensure_allowance(
		&self,
		client: &dyn ChainInterface,
		token: Address,
		amount: U256,
		gas_price: U256,
	) -> Result<(), FulfillError> {
		let chain_id = client.chain_id();
		let spender = client.intent_address();

		let needs_approval = match client
			.erc20_allowance(token, self.fulfiller_address, spender)
			.await
		{
			Ok(allowance) if allowance >= amount => {
				tracing::debug!(
					chain_id,
					allowance = %allowance,
					amount = %amount,
					"Existing allowance is sufficient, skipping approval"
				);
				false
			},
			Ok(_) => true,
			Err(e) => {
				tracing::warn!(chain_id, error = %e, "Failed to check allowance");
				true
			},
		};
		if !needs_approval {
			return Ok(());
		}

		tracing::info!(chain_id, token = %token, "Setting unlimited token approval");

		// Unlimited, to amortize future approvals.
		let nonce = self
			.nonce_manager
			.allocate(chain_id, client, self.fulfiller_address)
			.await?;
		let hash = match client
			.submit_approve(token, spender, U256::MAX, nonce, gas_price)
			.await
		{
			Ok(hash) => hash,
			Err(e) => {
				self.nonce_manager.mark_failed(chain_id, nonce).await;
				return Err(e.into());
			},
		};
		self.nonce_manager.track(chain_id, hash, nonce).await;

		let receipt = match client.wait_for_receipt(hash).await {
			Ok(receipt) => receipt,
			Err(e) => {
				self.nonce_manager.mark_failed(chain_id, nonce).await;
				return Err(e.into());
			},
		};
		if !receipt.success {
			self.nonce_manager.mark_failed(chain_id, nonce).await;
			return Err(FulfillError::ApproveFailed(chain_id));
		}
		self.nonce_manager.mark_confirmed(chain_id, nonce).await;

		metrics::GAS_USED
			.with_label_values(&[format!("{chain_id}_approval").as_str()])
			.observe(receipt.gas_used as f64);
		tracing::info!(
			chain_id,
			gas_used = receipt.gas_used,
			"Set unlimited token approval"
		);
		Ok(())
	}

	#[allow(clippy::too_many_arguments)]
	async fn submit_fulfill(
		&self,
		client: &dyn ChainInterface,
		intent: &Intent,
		intent_id: B256,
		token: Address,
		amount: U256,
		receiver: Address,
		gas_price: U256,
	) -> Result<(), FulfillError> {
		let chain_id = client.chain_id();

		let nonce = self
			.nonce_manager
			.allocate(chain_id, client, self.fulfiller_address)
			.await?;
		let hash = match client
			.submit_fulfill(intent_id, token, amount, receiver, nonce, gas_price)
			.await
		{
			Ok(hash) => hash,
			Err(e) => {
				self.nonce_manager.mark_failed(chain_id, nonce).await;
				return Err(e.into());
			},
		};
		self.nonce_manager.track(chain_id, hash, nonce).await;

		let receipt = match client.wait_for_receipt(hash).await {
			Ok(receipt) => receipt,
			Err(e) => {
				self.nonce_manager.mark_failed(chain_id, nonce).await;
				return Err(e.into());
			},
		};
		if !receipt.success {
			self.nonce_manager.mark_failed(chain_id, nonce).await;
			return Err(FulfillError::TransactionFailed(chain_id));
		}
		self.nonce_manager.mark_confirmed(chain_id, nonce).await;

		metrics::GAS_USED
			.with_label_values(&[chain_id.to_string().as_str()])
			.observe(receipt.gas_used as f64);
		tracing::info!(
			intent_id = %intent.id,
			chain_id,
			tx_hash = %hash,
			gas_used = receipt.gas_used,
			"Successfully fulfilled intent"
		);
		Ok(())
	}
}

/// Parses a hex intent id into a 32-byte value, left-padding short ids the
/// way `HexToHash` does.
fn parse_intent_id(id: &str) -> Result<B256, FulfillError> {
	let stripped = id.strip_prefix("0x").unwrap_or(id);
	if stripped.len() > 64 || stripped.is_empty() {
		return Err(FulfillError::InvalidIntentId(id.to_string()));
	}
	let padded = format!("{stripped:0>64}");
	let bytes =
		hex::decode(&padded).map_err(|_| FulfillError::InvalidIntentId(id.to_string()))?;
	Ok(B256::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfiller_chains::{ChainError, MockChainInterface, TxReceiptInfo};
	use fulfiller_types::ErrorKind;
	use mockall::predicate::eq;

	const USDC_POLYGON: &str = "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359";

	fn test_intent() -> Intent {
		Intent {
			id: "0xaa11".into(),
			source_chain: 1,
			destination_chain: 137,
			token: USDC_POLYGON.into(),
			amount: "1000000".into(),
			recipient: "0xbb22000000000000000000000000000000000000".into(),
			intent_fee: "200000".into(),
			status: "pending".into(),
			created_at: chrono::Utc::now(),
			updated_at: None,
		}
	}

	fn intent_contract() -> Address {
		"0x4017717c550E4B6E61048D412a718D6A8078d264"
			.parse()
			.unwrap()
	}

	fn base_mock() -> MockChainInterface {
		let mut chain = MockChainInterface::new();
		chain.expect_chain_id().return_const(137u64);
		chain.expect_intent_address().return_const(intent_contract());
		chain.expect_max_gas_price().return_const(U256::MAX);
		chain
			.expect_refresh_gas_price()
			.returning(|| Ok(U256::from(30_000_000_000u64)));
		chain
			.expect_pending_nonce()
			.returning(|_| Ok(7u64));
		chain
			.expect_wait_for_receipt()
			.returning(|hash| {
				Ok(TxReceiptInfo {
					hash,
					gas_used: 60_000,
					success: true,
				})
			});
		chain
	}

	fn engine_with(chain: MockChainInterface) -> FulfillmentEngine {
		let mut chains: HashMap<u64, Arc<dyn ChainInterface>> = HashMap::new();
		chains.insert(137, Arc::new(chain));
		FulfillmentEngine::new(
			Arc::new(chains),
			Arc::new(NonceManager::new()),
			Address::ZERO,
		)
	}

	#[tokio::test]
	async fn test_happy_path_approves_then_fulfills() {
		let mut chain = base_mock();
		chain
			.expect_erc20_allowance()
			.returning(|_, _, _| Ok(U256::ZERO));
		chain
			.expect_submit_approve()
			.times(1)
			.withf(|_, spender, amount, _, _| {
				*spender == intent_contract() && *amount == U256::MAX
			})
			.returning(|_, _, _, _, _| Ok(B256::repeat_byte(1)));
		chain
			.expect_submit_fulfill()
			.times(1)
			.with(
				eq(parse_intent_id("0xaa11").unwrap()),
				eq(USDC_POLYGON.parse::<Address>().unwrap()),
				eq(U256::from(1_000_000u64)),
				eq("0xbb22000000000000000000000000000000000000"
					.parse::<Address>()
					.unwrap()),
				eq(8u64), // approval consumed nonce 7
				eq(U256::from(30_000_000_000u64)),
			)
			.returning(|_, _, _, _, _, _| Ok(B256::repeat_byte(2)));

		let engine = engine_with(chain);
		engine.fulfill_intent(&test_intent()).await.unwrap();
	}

	#[tokio::test]
	async fn test_sufficient_allowance_skips_approval() {
		let mut chain = base_mock();
		chain
			.expect_erc20_allowance()
			.returning(|_, _, _| Ok(U256::MAX));
		chain.expect_submit_approve().times(0);
		chain
			.expect_submit_fulfill()
			.times(1)
			.returning(|_, _, _, _, _, _| Ok(B256::repeat_byte(2)));

		let engine = engine_with(chain);

		// Two back-to-back attempts issue zero approvals.
		engine.fulfill_intent(&test_intent()).await.unwrap();
	}

	#[tokio::test]
	async fn test_gas_ceiling_bounces_to_retry() {
		let mut chain = base_mock();
		chain.expect_max_gas_price().return_const(U256::from(1u64));

		let engine = engine_with(chain);
		let err = engine.fulfill_intent(&test_intent()).await.unwrap_err();
		assert!(matches!(err, FulfillError::GasPriceExceeded { .. }));
		assert_eq!(err.kind(), ErrorKind::Gas);
	}

	#[tokio::test]
	async fn test_gas_refresh_failure_uses_cached_price() {
		let mut chain = base_mock();
		chain
			.expect_refresh_gas_price()
			.returning(|| Err(ChainError::Network("timeout".into())));
		chain
			.expect_current_gas_price()
			.return_const(U256::from(20_000_000_000u64));
		chain
			.expect_erc20_allowance()
			.returning(|_, _, _| Ok(U256::MAX));
		chain
			.expect_submit_fulfill()
			.withf(|_, _, _, _, _, gas_price| *gas_price == U256::from(20_000_000_000u64))
			.returning(|_, _, _, _, _, _| Ok(B256::repeat_byte(2)));

		let engine = engine_with(chain);
		engine.fulfill_intent(&test_intent()).await.unwrap();
	}

	#[tokio::test]
	async fn test_unconfigured_chain_fails() {
		let engine = engine_with(base_mock());
		let mut intent = test_intent();
		intent.destination_chain = 42161;
		let err = engine.fulfill_intent(&intent).await.unwrap_err();
		assert!(matches!(err, FulfillError::ChainNotConfigured(42161)));
	}

	#[tokio::test]
	async fn test_unknown_token_fails() {
		let mut chain = base_mock();
		chain.expect_erc20_allowance().times(0);
		let engine = engine_with(chain);
		let mut intent = test_intent();
		intent.token = "0x1111111111111111111111111111111111111111".into();
		let err = engine.fulfill_intent(&intent).await.unwrap_err();
		assert!(matches!(err, FulfillError::TokenNotConfigured(137)));
	}

	#[tokio::test]
	async fn test_failed_approve_receipt_is_approve_error() {
		let mut chain = base_mock();
		chain
			.expect_erc20_allowance()
			.returning(|_, _, _| Ok(U256::ZERO));
		chain
			.expect_submit_approve()
			.returning(|_, _, _, _, _| Ok(B256::repeat_byte(1)));
		chain.expect_wait_for_receipt().returning(|hash| {
			Ok(TxReceiptInfo {
				hash,
				gas_used: 21_000,
				success: false,
			})
		});
		chain.expect_submit_fulfill().times(0);

		let engine = engine_with(chain);
		let err = engine.fulfill_intent(&test_intent()).await.unwrap_err();
		assert!(matches!(err, FulfillError::ApproveFailed(137)));
	}

	#[tokio::test]
	async fn test_failed_fulfill_receipt_is_transaction_error() {
		let mut chain = base_mock();
		chain
			.expect_erc20_allowance()
			.returning(|_, _, _| Ok(U256::MAX));
		chain
			.expect_submit_fulfill()
			.returning(|_, _, _, _, _, _| Ok(B256::repeat_byte(2)));
		chain.expect_wait_for_receipt().returning(|hash| {
			Ok(TxReceiptInfo {
				hash,
				gas_used: 50_000,
				success: false,
			})
		});

		let engine = engine_with(chain);
		let err = engine.fulfill_intent(&test_intent()).await.unwrap_err();
		assert!(matches!(err, FulfillError::TransactionFailed(137)));
	}

	#[tokio::test]
	async fn test_bsc_destination_amount_is_scaled_up() {
		let mut chain = MockChainInterface::new();
		chain.expect_chain_id().return_const(56u64);
		chain.expect_intent_address().return_const(intent_contract());
		chain.expect_max_gas_price().return_const(U256::MAX);
		chain
			.expect_refresh_gas_price()
			.returning(|| Ok(U256::from(30_000_000_000u64)));
		chain.expect_pending_nonce().returning(|_| Ok(7u64));
		chain.expect_wait_for_receipt().returning(|hash| {
			Ok(TxReceiptInfo {
				hash,
				gas_used: 60_000,
				success: true,
			})
		});
		chain
			.expect_erc20_allowance()
			.returning(|_, _, _| Ok(U256::MAX));
		chain
			.expect_submit_fulfill()
			.withf(|_, _, amount, _, _, _| {
				*amount == U256::from(1_000_000_000_000_000_000u64)
			})
			.returning(|_, _, _, _, _, _| Ok(B256::repeat_byte(2)));

		let mut chains: HashMap<u64, Arc<dyn ChainInterface>> = HashMap::new();
		chains.insert(56, Arc::new(chain));
		let engine = FulfillmentEngine::new(
			Arc::new(chains),
			Arc::new(NonceManager::new()),
			Address::ZERO,
		);

		let usdc_bsc = token_address(56, fulfiller_types::TokenType::Usdc).unwrap();
		let mut intent = test_intent();
		intent.destination_chain = 56;
		intent.token = usdc_bsc.to_string();
		intent.amount = "1000000".into();

		engine.fulfill_intent(&intent).await.unwrap();
	}

	#[test]
	fn test_parse_intent_id_pads_short_ids() {
		let id = parse_intent_id("0xaa11").unwrap();
		assert_eq!(id.as_slice()[30..], [0xaa, 0x11]);
		assert_eq!(id.as_slice()[..30], [0u8; 30]);
	}

	#[test]
	fn test_parse_intent_id_full_length() {
		let full = format!("0x{}", "ab".repeat(32));
		let id = parse_intent_id(&full).unwrap();
		assert_eq!(id, B256::repeat_byte(0xab));
	}

	#[test]
	fn test_parse_intent_id_rejects_garbage() {
		assert!(parse_intent_id("").is_err());
		assert!(parse_intent_id("0x").is_err());
		assert!(parse_intent_id("zz").is_err());
		assert!(parse_intent_id(&"a".repeat(65)).is_err());
	}
}
