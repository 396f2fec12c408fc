//! Per destination-chain circuit breaker.
//!
//! Failures are counted inside a sliding window; crossing the threshold
//! opens the circuit. After the reset timeout the breaker closes itself and
//! the next attempt either confirms recovery or trips it again (half-open
//! probing). Callers observe a linearizable view: every transition happens
//! under the state mutex.

use fulfiller_config::CircuitBreakerSettings;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct BreakerState {
	failure_count: u32,
	last_failure: Option<Instant>,
	tripped: bool,
	trip_time: Option<Instant>,
}

/// Snapshot of a breaker's counters, for logging and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
	pub failure_count: u32,
	pub last_failure: Option<Instant>,
	pub window: Duration,
	pub threshold: u32,
}

/// Circuit breaker guarding one destination chain.
pub struct CircuitBreaker {
	enabled: bool,
	threshold: u32,
	window: Duration,
	reset_timeout: Duration,
	state: Mutex<BreakerState>,
}

impl CircuitBreaker {
	pub fn new(settings: &CircuitBreakerSettings) -> Self {
		Self {
			enabled: settings.enabled,
			threshold: settings.threshold,
			window: settings.window,
			reset_timeout: settings.reset_timeout,
			state: Mutex::new(BreakerState::default()),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Records a failure. Returns true when the circuit is open after this
	/// call, i.e. it just tripped or was already open.
	pub fn record_failure(&self) -> bool {
		if !self.enabled {
			return false;
		}

		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		let now = Instant::now();

		// An expired trip closes here; the failure below starts a fresh
		// count (half-open probing).
		if state.tripped {
			let expired = state
				.trip_time
				.is_none_or(|at| now.duration_since(at) > self.reset_timeout);
			if expired {
				tracing::info!("Circuit breaker attempting to reset after timeout");
				state.tripped = false;
				state.failure_count = 0;
			} else {
				return true;
			}
		}

		// Failures older than the window no longer count.
		if let Some(last) = state.last_failure {
			if now.duration_since(last) > self.window {
				state.failure_count = 0;
			}
		}

		state.failure_count += 1;
		state.last_failure = Some(now);

		if state.failure_count >= self.threshold {
			state.tripped = true;
			state.trip_time = Some(now);
			tracing::warn!(
				failures = state.failure_count,
				window = ?self.window,
				"Circuit breaker tripped"
			);
			return true;
		}
		false
	}

	/// Whether the circuit is currently open. An expired trip auto-closes.
	pub fn is_open(&self) -> bool {
		if !self.enabled {
			return false;
		}

		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		if state.tripped {
			let expired = state
				.trip_time
				.is_none_or(|at| at.elapsed() > self.reset_timeout);
			if expired {
				state.tripped = false;
				state.failure_count = 0;
				return false;
			}
		}
		state.tripped
	}

	/// Unconditionally closes the circuit and zeroes the counter.
	pub fn reset(&self) {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		state.tripped = false;
		state.failure_count = 0;
	}

	pub fn snapshot(&self) -> BreakerSnapshot {
		let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		BreakerSnapshot {
			failure_count: state.failure_count,
			last_failure: state.last_failure,
			window: self.window,
			threshold: self.threshold,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn settings(threshold: u32, window: Duration, reset: Duration) -> CircuitBreakerSettings {
		CircuitBreakerSettings {
			enabled: true,
			threshold,
			window,
			reset_timeout: reset,
		}
	}

	#[tokio::test]
	async fn test_trips_at_threshold() {
		let breaker = CircuitBreaker::new(&settings(
			3,
			Duration::from_secs(300),
			Duration::from_secs(900),
		));

		assert!(!breaker.record_failure());
		assert!(!breaker.record_failure());
		assert!(!breaker.is_open());
		assert!(breaker.record_failure());
		assert!(breaker.is_open());
	}

	#[tokio::test]
	async fn test_open_stays_open_until_reset_timeout() {
		let breaker = CircuitBreaker::new(&settings(
			1,
			Duration::from_secs(300),
			Duration::from_secs(900),
		));
		assert!(breaker.record_failure());

		// Still open, and further failures keep reporting open.
		assert!(breaker.is_open());
		assert!(breaker.record_failure());
		assert!(breaker.is_open());
	}

	#[tokio::test(start_paused = true)]
	async fn test_auto_closes_after_reset_timeout() {
		let breaker = CircuitBreaker::new(&settings(
			1,
			Duration::from_secs(300),
			Duration::from_secs(900),
		));
		assert!(breaker.record_failure());
		assert!(breaker.is_open());

		tokio::time::advance(Duration::from_secs(901)).await;
		assert!(!breaker.is_open());
	}

	#[tokio::test(start_paused = true)]
	async fn test_half_open_retrip() {
		let breaker = CircuitBreaker::new(&settings(
			1,
			Duration::from_secs(300),
			Duration::from_secs(900),
		));
		assert!(breaker.record_failure());

		tokio::time::advance(Duration::from_secs(901)).await;
		// The trip expired; this failure both closes the old trip and trips
		// again at threshold 1.
		assert!(breaker.record_failure());
		assert!(breaker.is_open());
	}

	#[tokio::test(start_paused = true)]
	async fn test_window_expiry_zeroes_count() {
		let breaker = CircuitBreaker::new(&settings(
			3,
			Duration::from_secs(300),
			Duration::from_secs(900),
		));
		assert!(!breaker.record_failure());
		assert!(!breaker.record_failure());

		// Outside the window the count restarts, so two more failures do not
		// trip a threshold of three.
		tokio::time::advance(Duration::from_secs(301)).await;
		assert!(!breaker.record_failure());
		assert!(!breaker.record_failure());
		assert!(!breaker.is_open());
	}

	#[tokio::test]
	async fn test_reset_closes_immediately() {
		let breaker = CircuitBreaker::new(&settings(
			1,
			Duration::from_secs(300),
			Duration::from_secs(900),
		));
		assert!(breaker.record_failure());
		assert!(breaker.is_open());

		breaker.reset();
		assert!(!breaker.is_open());
		assert_eq!(breaker.snapshot().failure_count, 0);
	}

	#[tokio::test]
	async fn test_disabled_breaker_never_opens() {
		let mut s = settings(1, Duration::from_secs(300), Duration::from_secs(900));
		s.enabled = false;
		let breaker = CircuitBreaker::new(&s);

		assert!(!breaker.record_failure());
		assert!(!breaker.record_failure());
		assert!(!breaker.is_open());
	}

	#[tokio::test(start_paused = true)]
	async fn test_trip_is_monotone_within_reset_timeout() {
		let breaker = CircuitBreaker::new(&settings(
			1,
			Duration::from_secs(300),
			Duration::from_secs(900),
		));
		assert!(breaker.record_failure());

		for _ in 0..5 {
			tokio::time::advance(Duration::from_secs(100)).await;
			assert!(breaker.is_open());
		}
	}
}
