//! Environment-driven configuration for the intent fulfiller.
//!
//! Every setting has a default except the signing key; invalid values are
//! fatal at startup, before any task is spawned. Variables are read from the
//! process environment (the binary loads a `.env` file first).

pub mod defaults;

use alloy_primitives::{Address, U256};
use defaults::MAINNET_CHAINS;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_ENDPOINT: &str = "https://api.speedrun.exchange";
const DEFAULT_POLLING_INTERVAL_SECS: u64 = 5;
const DEFAULT_WORKER_COUNT: usize = 5;
const DEFAULT_METRICS_PORT: u16 = 8080;
const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_MAX_GAS_PRICE_WEI: &str = "1000000000"; // 1 gwei
const DEFAULT_GAS_MULTIPLIER: f64 = 1.1;
const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
const DEFAULT_CIRCUIT_BREAKER_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_CIRCUIT_BREAKER_RESET: Duration = Duration::from_secs(15 * 60);

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("{0} is required")]
	MissingVar(&'static str),
	#[error("invalid {var} value: {reason}")]
	InvalidVar { var: String, reason: String },
	#[error("unsupported network: {0}, only 'mainnet' is supported")]
	UnsupportedNetwork(String),
}

/// Circuit-breaker tuning shared by every per-chain breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
	pub enabled: bool,
	pub threshold: u32,
	pub window: Duration,
	pub reset_timeout: Duration,
}

/// Settings for one destination chain.
#[derive(Debug, Clone)]
pub struct ChainSettings {
	pub chain_id: u64,
	pub name: String,
	pub rpc_url: String,
	pub intent_address: Address,
	pub min_fee: U256,
	pub gas_multiplier: f64,
}

/// Complete fulfiller configuration.
#[derive(Debug, Clone)]
pub struct Config {
	pub api_endpoint: String,
	pub polling_interval: Duration,
	pub worker_count: usize,
	pub metrics_port: u16,
	pub metrics_api_key: Option<String>,
	/// Overrides the address derived from the signing key when set.
	pub fulfiller_address: Option<Address>,
	pub private_key: String,
	pub max_retries: u32,
	pub max_gas_price: U256,
	pub circuit_breaker: CircuitBreakerSettings,
	pub chains: HashMap<u64, ChainSettings>,
}

impl Config {
	/// Reads the full configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		let network = env_or("NETWORK", "mainnet");
		if network != "mainnet" {
			return Err(ConfigError::UnsupportedNetwork(network));
		}

		let private_key = std::env::var("PRIVATE_KEY")
			.ok()
			.filter(|v| !v.is_empty())
			.ok_or(ConfigError::MissingVar("PRIVATE_KEY"))?;
		validate_private_key(&private_key)?;

		let api_endpoint = env_or("API_ENDPOINT", DEFAULT_API_ENDPOINT);
		if !api_endpoint.starts_with("http://") && !api_endpoint.starts_with("https://") {
			return Err(ConfigError::InvalidVar {
				var: "API_ENDPOINT".into(),
				reason: format!("{api_endpoint} is not a valid URL"),
			});
		}

		let polling_interval = Duration::from_secs(env_parse_positive(
			"POLLING_INTERVAL",
			DEFAULT_POLLING_INTERVAL_SECS,
		)?);
		let worker_count = env_parse_positive("WORKER_COUNT", DEFAULT_WORKER_COUNT as u64)? as usize;
		let metrics_port = env_parse("METRICS_PORT", DEFAULT_METRICS_PORT)?;
		let max_retries = env_parse("MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
		let max_gas_price = parse_u256("MAX_GAS_PRICE", &env_or("MAX_GAS_PRICE", DEFAULT_MAX_GAS_PRICE_WEI))?;

		let metrics_api_key = std::env::var("METRICS_API_KEY").ok().filter(|v| !v.is_empty());

		let fulfiller_address = match std::env::var("FULFILLER_ADDRESS") {
			Ok(raw) if !raw.is_empty() => Some(parse_address("FULFILLER_ADDRESS", &raw)?),
			_ => None,
		};

		let circuit_breaker = CircuitBreakerSettings {
			enabled: env_parse_bool("CIRCUIT_BREAKER_ENABLED", true)?,
			threshold: env_parse_positive("CIRCUIT_BREAKER_THRESHOLD", DEFAULT_CIRCUIT_BREAKER_THRESHOLD as u64)? as u32,
			window: env_parse_duration("CIRCUIT_BREAKER_WINDOW", DEFAULT_CIRCUIT_BREAKER_WINDOW)?,
			reset_timeout: env_parse_duration("CIRCUIT_BREAKER_RESET", DEFAULT_CIRCUIT_BREAKER_RESET)?,
		};

		let mut chains = HashMap::new();
		for entry in &MAINNET_CHAINS {
			let settings = ChainSettings::from_env(entry)?;
			chains.insert(settings.chain_id, settings);
		}

		Ok(Self {
			api_endpoint,
			polling_interval,
			worker_count,
			metrics_port,
			metrics_api_key,
			fulfiller_address,
			private_key,
			max_retries,
			max_gas_price,
			circuit_breaker,
			chains,
		})
	}
}

impl ChainSettings {
	fn from_env(entry: &defaults::ChainDefaults) -> Result<Self, ConfigError> {
		let rpc_url = env_or(&format!("{}_RPC_URL", entry.prefix), entry.rpc_url);
		let intent_var = format!("{}_INTENT_ADDRESS", entry.prefix);
		let intent_address =
			parse_address(&intent_var, &env_or(&intent_var, entry.intent_address))?;
		let min_fee_var = format!("{}_MIN_FEE", entry.prefix);
		let min_fee = parse_u256(&min_fee_var, &env_or(&min_fee_var, entry.min_fee))?;

		let multiplier_var = format!("{}_GAS_MULTIPLIER", entry.prefix);
		let gas_multiplier = match std::env::var(&multiplier_var) {
			Ok(raw) if !raw.is_empty() => {
				let parsed: f64 = raw.parse().map_err(|_| ConfigError::InvalidVar {
					var: multiplier_var.clone(),
					reason: format!("{raw} is not a number"),
				})?;
				if parsed <= 0.0 {
					return Err(ConfigError::InvalidVar {
						var: multiplier_var,
						reason: "must be greater than 0".into(),
					});
				}
				parsed
			},
			_ => DEFAULT_GAS_MULTIPLIER,
		};

		Ok(Self {
			chain_id: entry.chain_id,
			name: entry.name.to_string(),
			rpc_url,
			intent_address,
			min_fee,
			gas_multiplier,
		})
	}
}

fn env_or(var: &str, default: &str) -> String {
	match std::env::var(var) {
		Ok(value) if !value.is_empty() => value,
		_ => default.to_string(),
	}
}

fn env_parse<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
	match std::env::var(var) {
		Ok(raw) if !raw.is_empty() => raw.parse().map_err(|_| ConfigError::InvalidVar {
			var: var.into(),
			reason: format!("{raw} is not a valid integer"),
		}),
		_ => Ok(default),
	}
}

fn env_parse_positive(var: &'static str, default: u64) -> Result<u64, ConfigError> {
	let value: u64 = env_parse(var, default)?;
	if value == 0 {
		return Err(ConfigError::InvalidVar {
			var: var.into(),
			reason: "must be greater than 0".into(),
		});
	}
	Ok(value)
}

fn env_parse_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
	match std::env::var(var) {
		Ok(raw) if !raw.is_empty() => match raw.as_str() {
			"true" => Ok(true),
			"false" => Ok(false),
			other => Err(ConfigError::InvalidVar {
				var: var.into(),
				reason: format!("{other} must be 'true' or 'false'"),
			}),
		},
		_ => Ok(default),
	}
}

fn env_parse_duration(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
	match std::env::var(var) {
		Ok(raw) if !raw.is_empty() => parse_duration(&raw).ok_or_else(|| ConfigError::InvalidVar {
			var: var.into(),
			reason: format!("{raw} is not a valid duration (expected e.g. 30s, 5m, 1h)"),
		}),
		_ => Ok(default),
	}
}

/// Parses `30s` / `5m` / `2h` style durations; a bare integer is seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
	let raw = raw.trim();
	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}
	let (value, unit) = raw.split_at(raw.len().checked_sub(1)?);
	let value: u64 = value.parse().ok()?;
	match unit {
		"s" => Some(Duration::from_secs(value)),
		"m" => Some(Duration::from_secs(value * 60)),
		"h" => Some(Duration::from_secs(value * 3600)),
		_ => None,
	}
}

fn parse_address(var: &str, raw: &str) -> Result<Address, ConfigError> {
	raw.parse().map_err(|_| ConfigError::InvalidVar {
		var: var.into(),
		reason: format!("{raw} is not a valid address"),
	})
}

fn parse_u256(var: &str, raw: &str) -> Result<U256, ConfigError> {
	raw.parse().map_err(|_| ConfigError::InvalidVar {
		var: var.into(),
		reason: format!("{raw} is not a valid integer"),
	})
}

fn validate_private_key(raw: &str) -> Result<(), ConfigError> {
	let hex = raw.strip_prefix("0x").unwrap_or(raw);
	if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
		return Err(ConfigError::InvalidVar {
			var: "PRIVATE_KEY".into(),
			reason: "must be a 32-byte hex string".into(),
		});
	}
	Ok(())
}
