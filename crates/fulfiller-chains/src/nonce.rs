//! Per-chain nonce allocation and pending-transaction tracking.
//!
//! The manager is the single source of truth for outbound nonces: allocation
//! is strictly monotonic per chain, and a failed transaction returns its
//! nonce to the pool only when no lower nonce is still pending, so gaps
//! cannot form.

use crate::{ChainError, ChainInterface};
use alloy_primitives::{Address, B256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long a tracked transaction may stay pending before it is considered
/// timed out.
const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// How long the locally tracked nonce is trusted before re-reading the
/// chain's pending nonce.
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Status of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
	Pending,
	TimedOut,
}

#[derive(Debug, Clone)]
struct PendingTx {
	hash: B256,
	created_at: Instant,
	status: TxStatus,
}

#[derive(Debug, Default)]
struct ChainNonces {
	next_nonce: u64,
	pending: HashMap<u64, PendingTx>,
	last_sync: Option<Instant>,
}

impl ChainNonces {
	fn lowest_pending(&self) -> Option<u64> {
		self.pending.keys().min().copied()
	}
}

/// Nonce manager shared by all workers.
pub struct NonceManager {
	chains: Mutex<HashMap<u64, ChainNonces>>,
	tx_timeout: Duration,
	sync_interval: Duration,
}

impl Default for NonceManager {
	fn default() -> Self {
		Self::new()
	}
}

impl NonceManager {
	pub fn new() -> Self {
		Self {
			chains: Mutex::new(HashMap::new()),
			tx_timeout: DEFAULT_TX_TIMEOUT,
			sync_interval: DEFAULT_SYNC_INTERVAL,
		}
	}

	#[cfg(test)]
	fn with_timeouts(tx_timeout: Duration, sync_interval: Duration) -> Self {
		Self {
			chains: Mutex::new(HashMap::new()),
			tx_timeout,
			sync_interval,
		}
	}

	/// Reserves the next nonce for a chain.
	///
	/// When the local view has never been synced, or the last sync is older
	/// than the sync interval, the chain's pending nonce is fetched first and
	/// adopted if it is ahead of the local counter. The lock is not held
	/// across the RPC round-trip.
	pub async fn allocate(
		&self,
		chain_id: u64,
		client: &dyn ChainInterface,
		address: Address,
	) -> Result<u64, ChainError> {
		let needs_sync = {
			let mut chains = self.chains.lock().await;
			let state = chains.entry(chain_id).or_default();
			state
				.last_sync
				.is_none_or(|at| at.elapsed() > self.sync_interval)
		};

		if needs_sync {
			let onchain = client.pending_nonce(address).await?;
			self.adopt(chain_id, onchain).await;
		}

		let mut chains = self.chains.lock().await;
		let state = chains.entry(chain_id).or_default();
		let nonce = state.next_nonce;
		state.next_nonce += 1;
		Ok(nonce)
	}

	/// Adopts the chain's pending nonce if it is ahead of the local counter
	/// and stamps the sync time.
	pub async fn adopt(&self, chain_id: u64, onchain_nonce: u64) {
		let mut chains = self.chains.lock().await;
		let state = chains.entry(chain_id).or_default();
		if onchain_nonce > state.next_nonce {
			tracing::info!(
				chain_id,
				local = state.next_nonce,
				onchain = onchain_nonce,
				"Adopting chain nonce"
			);
			state.next_nonce = onchain_nonce;
		}
		state.last_sync = Some(Instant::now());
	}

	/// Records a submitted transaction as pending.
	pub async fn track(&self, chain_id: u64, hash: B256, nonce: u64) {
		let mut chains = self.chains.lock().await;
		let state = chains.entry(chain_id).or_default();
		state.pending.insert(
			nonce,
			PendingTx {
				hash,
				created_at: Instant::now(),
				status: TxStatus::Pending,
			},
		);
		tracing::debug!(chain_id, nonce, hash = %hash, "Tracking transaction");
	}

	/// Drops a confirmed transaction. The next-nonce counter is untouched.
	pub async fn mark_confirmed(&self, chain_id: u64, nonce: u64) {
		let mut chains = self.chains.lock().await;
		let state = chains.entry(chain_id).or_default();
		if state.pending.remove(&nonce).is_none() {
			tracing::warn!(chain_id, nonce, "No pending transaction to confirm");
		}
	}

	/// Drops a failed transaction and reclaims its nonce when safe.
	///
	/// The nonce is reused only when no lower nonce is still pending, which
	/// covers both the tracked lowest-pending case and submissions that
	/// failed before they could be tracked.
	pub async fn mark_failed(&self, chain_id: u64, nonce: u64) {
		let mut chains = self.chains.lock().await;
		let state = chains.entry(chain_id).or_default();
		state.pending.remove(&nonce);

		let reusable = state.lowest_pending().is_none_or(|lowest| nonce < lowest);
		if reusable && state.next_nonce > nonce {
			tracing::info!(chain_id, nonce, "Reusing nonce after transaction failure");
			state.next_nonce = nonce;
		}
	}

	/// Marks transactions pending longer than the timeout and returns their
	/// nonces.
	pub async fn find_timed_out(&self, chain_id: u64) -> Vec<u64> {
		let mut chains = self.chains.lock().await;
		let state = chains.entry(chain_id).or_default();
		let mut timed_out = Vec::new();
		for (nonce, tx) in state.pending.iter_mut() {
			if tx.status == TxStatus::Pending && tx.created_at.elapsed() > self.tx_timeout {
				tx.status = TxStatus::TimedOut;
				tracing::warn!(chain_id, nonce = *nonce, hash = %tx.hash, "Transaction timed out");
				timed_out.push(*nonce);
			}
		}
		timed_out.sort_unstable();
		timed_out
	}

	/// Force-fetches the chain's pending nonce and adopts it if higher.
	pub async fn resync(
		&self,
		chain_id: u64,
		client: &dyn ChainInterface,
		address: Address,
	) -> Result<(), ChainError> {
		let onchain = client.pending_nonce(address).await?;
		self.adopt(chain_id, onchain).await;
		Ok(())
	}

	/// Number of tracked pending transactions for a chain.
	pub async fn pending_count(&self, chain_id: u64) -> usize {
		let mut chains = self.chains.lock().await;
		chains.entry(chain_id).or_default().pending.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::TxReceiptInfo;
	use alloy_primitives::U256;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicU64, Ordering};

	/// Chain stub that only answers `pending_nonce`.
	struct StubChain {
		onchain_nonce: AtomicU64,
	}

	impl StubChain {
		fn new(nonce: u64) -> Self {
			Self {
				onchain_nonce: AtomicU64::new(nonce),
			}
		}

		fn set_nonce(&self, nonce: u64) {
			self.onchain_nonce.store(nonce, Ordering::SeqCst);
		}
	}

	#[async_trait]
	impl ChainInterface for StubChain {
		fn chain_id(&self) -> u64 {
			137
		}
		fn name(&self) -> String {
			"Polygon".into()
		}
		fn intent_address(&self) -> Address {
			Address::ZERO
		}
		fn min_fee(&self) -> U256 {
			U256::ZERO
		}
		fn max_gas_price(&self) -> U256 {
			U256::MAX
		}
		fn current_gas_price(&self) -> U256 {
			U256::ZERO
		}
		async fn refresh_gas_price(&self) -> Result<U256, ChainError> {
			Ok(U256::ZERO)
		}
		async fn latest_block_number(&self) -> Result<u64, ChainError> {
			Ok(0)
		}
		async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
			Ok(self.onchain_nonce.load(Ordering::SeqCst))
		}
		async fn erc20_balance(&self, _: Address, _: Address) -> Result<U256, ChainError> {
			Ok(U256::ZERO)
		}
		async fn erc20_allowance(
			&self,
			_: Address,
			_: Address,
			_: Address,
		) -> Result<U256, ChainError> {
			Ok(U256::ZERO)
		}
		async fn erc20_decimals(&self, _: Address) -> Result<u8, ChainError> {
			Ok(6)
		}
		async fn erc20_symbol(&self, _: Address) -> Result<String, ChainError> {
			Ok("USDC".into())
		}
		async fn submit_approve(
			&self,
			_: Address,
			_: Address,
			_: U256,
			_: u64,
			_: U256,
		) -> Result<B256, ChainError> {
			Ok(B256::ZERO)
		}
		async fn submit_fulfill(
			&self,
			_: B256,
			_: Address,
			_: U256,
			_: Address,
			_: u64,
			_: U256,
		) -> Result<B256, ChainError> {
			Ok(B256::ZERO)
		}
		async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceiptInfo, ChainError> {
			Ok(TxReceiptInfo {
				hash,
				gas_used: 0,
				success: true,
			})
		}
	}

	fn hash(n: u8) -> B256 {
		B256::repeat_byte(n)
	}

	#[tokio::test]
	async fn test_allocate_is_strictly_monotonic() {
		let manager = NonceManager::new();
		let chain = StubChain::new(10);

		let a = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		let b = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		let c = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!((a, b, c), (10, 11, 12));
	}

	#[tokio::test]
	async fn test_allocate_adopts_higher_onchain_nonce_only() {
		let manager = NonceManager::new();
		let chain = StubChain::new(5);

		let first = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(first, 5);

		// A lower on-chain nonce must never rewind the local counter.
		chain.set_nonce(0);
		manager.resync(137, &chain, Address::ZERO).await.unwrap();
		let next = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(next, 6);
	}

	#[tokio::test(start_paused = true)]
	async fn test_allocate_resyncs_after_staleness() {
		let manager = NonceManager::new();
		let chain = StubChain::new(0);

		let first = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(first, 0);

		// Another sender moved the chain nonce ahead of us.
		chain.set_nonce(40);
		tokio::time::advance(Duration::from_secs(6 * 60)).await;

		let resynced = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(resynced, 40);
	}

	#[tokio::test]
	async fn test_mark_failed_lowest_pending_reuses_nonce() {
		let manager = NonceManager::new();
		let chain = StubChain::new(0);

		let n0 = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		let n1 = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		manager.track(137, hash(1), n0).await;
		manager.track(137, hash(2), n1).await;

		manager.mark_failed(137, n0).await;

		// The failed lowest nonce is handed out exactly once more.
		let reused = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(reused, n0);
		let after = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(after, n0 + 1);
	}

	#[tokio::test]
	async fn test_mark_failed_with_lower_pending_keeps_counter() {
		let manager = NonceManager::new();
		let chain = StubChain::new(0);

		let n0 = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		let n1 = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		manager.track(137, hash(1), n0).await;
		manager.track(137, hash(2), n1).await;

		// n1 fails while n0 is still pending; its slot must not be reused.
		manager.mark_failed(137, n1).await;
		let next = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(next, n1 + 1);
		assert_eq!(manager.pending_count(137).await, 1);
	}

	#[tokio::test]
	async fn test_mark_confirmed_keeps_counter() {
		let manager = NonceManager::new();
		let chain = StubChain::new(0);

		let n0 = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		manager.track(137, hash(1), n0).await;
		manager.mark_confirmed(137, n0).await;

		let next = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(next, n0 + 1);
		assert_eq!(manager.pending_count(137).await, 0);
	}

	#[tokio::test]
	async fn test_untracked_failure_reclaims_slot() {
		let manager = NonceManager::new();
		let chain = StubChain::new(0);

		// Submission failed before the transaction could be tracked.
		let n0 = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		manager.mark_failed(137, n0).await;

		let reused = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		assert_eq!(reused, n0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_find_timed_out_marks_once() {
		let manager =
			NonceManager::with_timeouts(Duration::from_secs(60), Duration::from_secs(300));
		let chain = StubChain::new(0);

		let n0 = manager.allocate(137, &chain, Address::ZERO).await.unwrap();
		manager.track(137, hash(1), n0).await;

		assert!(manager.find_timed_out(137).await.is_empty());

		tokio::time::advance(Duration::from_secs(90)).await;
		assert_eq!(manager.find_timed_out(137).await, vec![n0]);
		// Already marked; a second scan reports nothing new.
		assert!(manager.find_timed_out(137).await.is_empty());
	}
}
