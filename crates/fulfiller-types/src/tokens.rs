//! Static token table for USDC/USDT across the supported chains.
//!
//! The table is immutable after compilation; lookups are by (chain, token
//! type) for addresses and decimals, and by address for the reverse mapping
//! the filter uses on incoming intents.

use crate::chains::{self, SUPPORTED_CHAINS};
use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The token kinds the fulfiller settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
	Usdc,
	Usdt,
}

/// Every supported token type.
pub const TOKEN_TYPES: [TokenType; 2] = [TokenType::Usdc, TokenType::Usdt];

impl TokenType {
	/// Symbol used on chain and as a metric label.
	pub fn as_str(&self) -> &'static str {
		match self {
			TokenType::Usdc => "USDC",
			TokenType::Usdt => "USDT",
		}
	}
}

impl fmt::Display for TokenType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Contract address of a token on a chain.
pub fn token_address(chain_id: u64, token: TokenType) -> Option<Address> {
	match (token, chain_id) {
		(TokenType::Usdc, chains::ETHEREUM_CHAIN_ID) => {
			Some(address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))
		},
		(TokenType::Usdc, chains::POLYGON_CHAIN_ID) => {
			Some(address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359"))
		},
		(TokenType::Usdc, chains::ARBITRUM_CHAIN_ID) => {
			Some(address!("af88d065e77c8cC2239327C5EDb3A432268e5831"))
		},
		(TokenType::Usdc, chains::AVALANCHE_CHAIN_ID) => {
			Some(address!("b97ef9ef8734c71904d8002f8b6bc66dd9c48a6e"))
		},
		(TokenType::Usdc, chains::BSC_CHAIN_ID) => {
			Some(address!("8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"))
		},
		(TokenType::Usdc, chains::ZETACHAIN_CHAIN_ID) => {
			Some(address!("0cbe0dF132a6c6B4a2974Fa1b7Fb953CF0Cc798a"))
		},
		(TokenType::Usdc, chains::BASE_CHAIN_ID) => {
			Some(address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"))
		},
		(TokenType::Usdt, chains::ETHEREUM_CHAIN_ID) => {
			Some(address!("dAC17F958D2ee523a2206206994597C13D831ec7"))
		},
		(TokenType::Usdt, chains::POLYGON_CHAIN_ID) => {
			Some(address!("c2132D05D31c914a87C6611C10748AEb04B58e8F"))
		},
		(TokenType::Usdt, chains::ARBITRUM_CHAIN_ID) => {
			Some(address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"))
		},
		(TokenType::Usdt, chains::AVALANCHE_CHAIN_ID) => {
			Some(address!("9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7"))
		},
		(TokenType::Usdt, chains::BSC_CHAIN_ID) => {
			Some(address!("55d398326f99059fF775485246999027B3197955"))
		},
		(TokenType::Usdt, chains::ZETACHAIN_CHAIN_ID) => {
			Some(address!("7c8dDa80bbBE1254a7aACf3219EBe1481c6E01d7"))
		},
		(TokenType::Usdt, chains::BASE_CHAIN_ID) => {
			Some(address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb"))
		},
		_ => None,
	}
}

/// Decimals of a token on a chain. BSC variants use 18, everything else 6.
pub fn token_decimals(chain_id: u64, _token: TokenType) -> u8 {
	if chain_id == chains::BSC_CHAIN_ID {
		18
	} else {
		6
	}
}

/// Reverse lookup from a token contract address to its type.
///
/// Addresses compare byte-wise, so hex-case differences in the intent payload
/// are absorbed by parsing before the lookup.
pub fn token_type_for_address(address: Address) -> Option<TokenType> {
	for chain_id in SUPPORTED_CHAINS {
		for token in TOKEN_TYPES {
			if token_address(chain_id, token) == Some(address) {
				return Some(token);
			}
		}
	}
	None
}

/// Scales a base-unit amount to human units for display and gauges.
pub fn display_units(amount: U256, decimals: u8) -> f64 {
	let raw = u128::try_from(amount).unwrap_or(u128::MAX) as f64;
	raw / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_token_addresses_cover_all_chains() {
		for chain_id in SUPPORTED_CHAINS {
			for token in TOKEN_TYPES {
				assert!(
					token_address(chain_id, token).is_some(),
					"missing {token} on chain {chain_id}"
				);
			}
		}
	}

	#[test]
	fn test_unknown_chain_has_no_tokens() {
		assert_eq!(token_address(31337, TokenType::Usdc), None);
	}

	#[test]
	fn test_reverse_lookup_finds_type() {
		let usdc_polygon = token_address(137, TokenType::Usdc).unwrap();
		assert_eq!(token_type_for_address(usdc_polygon), Some(TokenType::Usdc));

		let usdt_bsc = token_address(56, TokenType::Usdt).unwrap();
		assert_eq!(token_type_for_address(usdt_bsc), Some(TokenType::Usdt));
	}

	#[test]
	fn test_reverse_lookup_case_insensitive_via_parsing() {
		let lower: Address = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
			.parse()
			.unwrap();
		assert_eq!(token_type_for_address(lower), Some(TokenType::Usdc));
	}

	#[test]
	fn test_reverse_lookup_unknown_address() {
		assert_eq!(token_type_for_address(Address::ZERO), None);
	}

	#[test]
	fn test_bsc_decimals_differ() {
		assert_eq!(token_decimals(56, TokenType::Usdc), 18);
		assert_eq!(token_decimals(1, TokenType::Usdc), 6);
		assert_eq!(token_decimals(137, TokenType::Usdt), 6);
	}

	#[test]
	fn test_display_units() {
		assert_eq!(display_units(U256::from(1_000_000u64), 6), 1.0);
		assert_eq!(display_units(U256::from(2_500_000u64), 6), 2.5);
	}
}
