//! Contract bindings for the ERC-20 surface and the intent settler.

use alloy_sol_types::sol;

sol! {
	/// Minimal ERC-20 surface the fulfiller touches.
	#[derive(Debug)]
	interface IERC20 {
		function allowance(address owner, address spender) external view returns (uint256);
		function approve(address spender, uint256 value) external returns (bool);
		function balanceOf(address owner) external view returns (uint256);
		function symbol() external view returns (string);
		function decimals() external view returns (uint8);
	}

	/// Destination-side intent settlement contract.
	#[derive(Debug)]
	interface IIntent {
		function fulfill(bytes32 intentId, address asset, uint256 amount, address receiver) external;
	}
}
