//! Mainnet defaults for the supported chains.
//!
//! Each entry carries the deployed intent-settler address and a public RPC
//! endpoint. Environment variables override any of these for debugging.
//! Min fees are base amounts in USDC/USDT units (18 decimals on BSC).

/// Static per-chain defaults, overridable via `{PREFIX}_*` variables.
pub struct ChainDefaults {
	pub chain_id: u64,
	pub name: &'static str,
	/// Environment-variable prefix, e.g. `BASE` for `BASE_RPC_URL`.
	pub prefix: &'static str,
	pub rpc_url: &'static str,
	pub intent_address: &'static str,
	pub min_fee: &'static str,
}

pub const MAINNET_CHAINS: [ChainDefaults; 7] = [
	ChainDefaults {
		chain_id: 8453,
		name: "Base",
		prefix: "BASE",
		rpc_url: "https://mainnet.base.org",
		intent_address: "0x999fce149FD078DCFaa2C681e060e00F528552f4",
		min_fee: "100000",
	},
	ChainDefaults {
		chain_id: 42161,
		name: "Arbitrum",
		prefix: "ARBITRUM",
		rpc_url: "https://arb1.arbitrum.io/rpc",
		intent_address: "0xD6B0E2a8D115cCA2823c5F80F8416644F3970dD2",
		min_fee: "100000",
	},
	ChainDefaults {
		chain_id: 137,
		name: "Polygon",
		prefix: "POLYGON",
		rpc_url: "https://polygon-rpc.com",
		intent_address: "0x4017717c550E4B6E61048D412a718D6A8078d264",
		min_fee: "100000",
	},
	ChainDefaults {
		chain_id: 1,
		name: "Ethereum",
		prefix: "ETHEREUM",
		rpc_url: "https://eth.llamarpc.com",
		intent_address: "0x951AB2A5417a51eB5810aC44BC1fC716995C1CAB",
		min_fee: "1000000",
	},
	ChainDefaults {
		chain_id: 43114,
		name: "Avalanche",
		prefix: "AVALANCHE",
		rpc_url: "https://avalanche-c-chain-rpc.publicnode.com",
		intent_address: "0x9a22A7d337aF1801BEEcDBE7f4f04BbD09F9E5bb",
		min_fee: "100000",
	},
	ChainDefaults {
		chain_id: 56,
		name: "BSC",
		prefix: "BSC",
		rpc_url: "https://bsc-dataseed.bnbchain.org",
		intent_address: "0x68282fa70a32E52711d437b6c5984B714Eec3ED0",
		min_fee: "400000000000000000",
	},
	ChainDefaults {
		chain_id: 7000,
		name: "ZetaChain",
		prefix: "ZETACHAIN",
		rpc_url: "https://zetachain-evm.blockpi.network/v1/rpc/public",
		intent_address: "0x986e2db1aF08688dD3C9311016026daD15969e09",
		min_fee: "100000",
	},
];
