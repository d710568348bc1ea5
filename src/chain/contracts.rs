//! ABI bindings for the ERC-20 standard and the DEX router, plus calldata helpers.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
        function transfer(address to, uint256 value) returns (bool);
        function approve(address spender, uint256 value) returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    contract IJoeRouter {
        function getAmountsOut(uint256 amountIn, address[] path)
            external view returns (uint256[] amounts);
        function swapExactAVAXForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external payable returns (uint256[] amounts);
        function swapExactTokensForAVAX(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external returns (uint256[] amounts);
    }
}

pub fn transfer_calldata(to: Address, value: U256) -> Bytes {
    IERC20::transferCall { to, value }.abi_encode().into()
}

pub fn approve_calldata(spender: Address, value: U256) -> Bytes {
    IERC20::approveCall { spender, value }.abi_encode().into()
}

pub fn swap_native_for_tokens_calldata(
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: U256,
) -> Bytes {
    IJoeRouter::swapExactAVAXForTokensCall {
        amountOutMin: amount_out_min,
        path: path.to_vec(),
        to,
        deadline,
    }
    .abi_encode()
    .into()
}

pub fn swap_tokens_for_native_calldata(
    amount_in: U256,
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: U256,
) -> Bytes {
    IJoeRouter::swapExactTokensForAVAXCall {
        amountIn: amount_in,
        amountOutMin: amount_out_min,
        path: path.to_vec(),
        to,
        deadline,
    }
    .abi_encode()
    .into()
}

/// Recipient and value of an ERC-20 `transfer` call, if `input` is one
pub fn decode_transfer(input: &[u8]) -> Option<(Address, U256)> {
    IERC20::transferCall::abi_decode(input)
        .ok()
        .map(|call| (call.to, call.value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_calldata_decodes_back() {
        let to = Address::repeat_byte(0x11);
        let data = transfer_calldata(to, U256::from(5u8));
        assert_eq!(&data[..4], IERC20::transferCall::SELECTOR.as_slice());
        assert_eq!(decode_transfer(&data), Some((to, U256::from(5u8))));
    }

    #[test]
    fn test_approve_is_not_a_transfer() {
        let data = approve_calldata(Address::repeat_byte(0x22), U256::MAX);
        assert_eq!(&data[..4], IERC20::approveCall::SELECTOR.as_slice());
        assert_eq!(decode_transfer(&data), None);
    }

    #[test]
    fn test_swap_calldata_carries_min_output() {
        let path = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let data = swap_native_for_tokens_calldata(
            U256::from(950u64),
            &path,
            Address::repeat_byte(3),
            U256::from(1_700_000_600u64),
        );
        let call = IJoeRouter::swapExactAVAXForTokensCall::abi_decode(&data).unwrap();
        assert_eq!(call.amountOutMin, U256::from(950u64));
        assert_eq!(call.path, path.to_vec());
        assert_eq!(call.deadline, U256::from(1_700_000_600u64));
    }
}
