//! Supported chain ids, names and unit-normalization helpers.

use alloy_primitives::U256;

pub const ETHEREUM_CHAIN_ID: u64 = 1;
pub const BSC_CHAIN_ID: u64 = 56;
pub const POLYGON_CHAIN_ID: u64 = 137;
pub const ZETACHAIN_CHAIN_ID: u64 = 7000;
pub const BASE_CHAIN_ID: u64 = 8453;
pub const ARBITRUM_CHAIN_ID: u64 = 42161;
pub const AVALANCHE_CHAIN_ID: u64 = 43114;

/// All chains the fulfiller knows about.
pub const SUPPORTED_CHAINS: [u64; 7] = [
	ETHEREUM_CHAIN_ID,
	BSC_CHAIN_ID,
	POLYGON_CHAIN_ID,
	ZETACHAIN_CHAIN_ID,
	BASE_CHAIN_ID,
	ARBITRUM_CHAIN_ID,
	AVALANCHE_CHAIN_ID,
];

/// Human-readable chain name, used as a metric label.
pub fn chain_name(chain_id: u64) -> Option<&'static str> {
	match chain_id {
		ETHEREUM_CHAIN_ID => Some("Ethereum"),
		BSC_CHAIN_ID => Some("BSC"),
		POLYGON_CHAIN_ID => Some("Polygon"),
		ZETACHAIN_CHAIN_ID => Some("ZetaChain"),
		BASE_CHAIN_ID => Some("Base"),
		ARBITRUM_CHAIN_ID => Some("Arbitrum"),
		AVALANCHE_CHAIN_ID => Some("Avalanche"),
		_ => None,
	}
}

/// Upstream price-API id for the chain's native token.
///
/// ETH-settled chains all share the "ethereum" entry so their price lookups
/// hit the same cache slot.
pub fn coingecko_token_id(chain_id: u64) -> Option<&'static str> {
	match chain_id {
		ETHEREUM_CHAIN_ID | ARBITRUM_CHAIN_ID | BASE_CHAIN_ID => Some("ethereum"),
		POLYGON_CHAIN_ID => Some("matic-network"),
		BSC_CHAIN_ID => Some("binancecoin"),
		AVALANCHE_CHAIN_ID => Some("avalanche-2"),
		ZETACHAIN_CHAIN_ID => Some("zetachain"),
		_ => None,
	}
}

/// USDC/USDT on BSC use 18 decimals where every other supported chain uses 6.
const BSC_UNIT_FACTOR: u64 = 1_000_000_000_000;

/// Converts a base-unit amount between the source and destination decimal
/// conventions.
///
/// When the source is BSC and the destination is not, the amount is divided
/// by 10^12 (truncating); the mirror case multiplies. Self-chain intents are
/// rejected upstream, so both sides are never BSC at once.
pub fn normalize_amount(amount: U256, source_chain: u64, destination_chain: u64) -> U256 {
	if source_chain == BSC_CHAIN_ID && destination_chain != BSC_CHAIN_ID {
		amount / U256::from(BSC_UNIT_FACTOR)
	} else if destination_chain == BSC_CHAIN_ID && source_chain != BSC_CHAIN_ID {
		amount.saturating_mul(U256::from(BSC_UNIT_FACTOR))
	} else {
		amount
	}
}
