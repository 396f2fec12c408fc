//! Shared TTL-bounded cache for native-token USD prices.
//!
//! All chain clients read through one process-wide cache keyed by the
//! upstream token id, so the ETH-settled chains resolve a single "ethereum"
//! entry instead of hammering the price API once per chain.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
	price: f64,
	fetched_at: Instant,
}

/// TTL-bounded token price cache.
pub struct TokenPriceCache {
	entries: RwLock<HashMap<String, CachedPrice>>,
	ttl: RwLock<Duration>,
}

impl TokenPriceCache {
	pub fn new(ttl: Duration) -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
			ttl: RwLock::new(ttl),
		}
	}

	/// Returns the cached price when the entry is younger than the TTL.
	pub fn get(&self, token_id: &str) -> Option<f64> {
		let ttl = *self.ttl.read().unwrap_or_else(PoisonError::into_inner);
		let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
		let cached = entries.get(token_id)?;
		if cached.fetched_at.elapsed() > ttl {
			return None;
		}
		Some(cached.price)
	}

	/// Stores a price with the current timestamp.
	pub fn set(&self, token_id: &str, price: f64) {
		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
		entries.insert(
			token_id.to_string(),
			CachedPrice {
				price,
				fetched_at: Instant::now(),
			},
		);
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();
	}

	pub fn len(&self) -> usize {
		self.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn set_ttl(&self, ttl: Duration) {
		*self.ttl.write().unwrap_or_else(PoisonError::into_inner) = ttl;
	}
}

static GLOBAL_CACHE: Lazy<TokenPriceCache> =
	Lazy::new(|| TokenPriceCache::new(DEFAULT_CACHE_TTL));

/// The process-wide cache shared by all fee loops.
pub fn global() -> &'static TokenPriceCache {
	&GLOBAL_CACHE
}

/// Changes the global TTL. Intended for tests.
pub fn set_global_ttl(ttl: Duration) {
	GLOBAL_CACHE.set_ttl(ttl);
}

/// Empties the global cache. Intended for tests, to avoid cross-test
/// contamination.
pub fn clear_global() {
	GLOBAL_CACHE.clear();
}
