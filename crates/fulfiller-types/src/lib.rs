//! Common types for the intent fulfiller.
//!
//! This crate defines the data model shared across the fulfiller crates:
//! intents as served by the upstream API, the error-kind classification used
//! for retry decisions, the registry of supported chains, and the static
//! USDC/USDT token table.

/// Supported chain ids, names and unit-normalization helpers.
pub mod chains;
/// Error-kind classification for fulfillment failures.
pub mod errors;
/// Intent model as served by the intents API.
pub mod intent;
/// Static token table for USDC/USDT across the supported chains.
pub mod tokens;

pub use chains::{chain_name, coingecko_token_id, normalize_amount, BSC_CHAIN_ID, SUPPORTED_CHAINS};
pub use errors::{classify_message, ErrorKind};
pub use intent::{Intent, PendingJob};
pub use tokens::{display_units, token_address, token_decimals, token_type_for_address, TokenType};
