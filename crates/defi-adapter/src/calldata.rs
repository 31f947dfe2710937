//! Contract call payloads for the supported protocols.

use alloy_primitives::U256;
use chain_evm::abi::{encode_function_call, selector, AbiParam};

pub const SWAP_EXACT_TOKENS_FOR_TOKENS: &str =
    "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)";
pub const SWAP_EXACT_ETH_FOR_TOKENS: &str =
    "swapExactETHForTokens(uint256,address[],address,uint256)";
pub const SWAP_EXACT_TOKENS_FOR_ETH: &str =
    "swapExactTokensForETH(uint256,uint256,address[],address,uint256)";
pub const EXACT_INPUT_SINGLE: &str =
    "exactInputSingle((address,address,uint24,address,uint256,uint256,uint160))";
pub const ADD_LIQUIDITY: &str =
    "addLiquidity(address,address,uint256,uint256,uint256,uint256,address,uint256)";
pub const ADD_LIQUIDITY_ETH: &str =
    "addLiquidityETH(address,uint256,uint256,uint256,address,uint256)";
pub const REMOVE_LIQUIDITY: &str =
    "removeLiquidity(address,address,uint256,uint256,uint256,address,uint256)";
pub const AAVE_SUPPLY: &str = "supply(address,uint256,address,uint16)";
pub const AAVE_WITHDRAW: &str = "withdraw(address,uint256,address)";
pub const LIDO_SUBMIT: &str = "submit(address)";
pub const LIDO_REQUEST_WITHDRAWALS: &str = "requestWithdrawals(uint256[],address)";

fn call(signature: &str, params: &[AbiParam]) -> Vec<u8> {
    encode_function_call(selector(signature), params)
}

pub fn swap_exact_tokens_for_tokens(
    amount_in: U256,
    amount_out_min: U256,
    path: Vec<[u8; 20]>,
    to: [u8; 20],
    deadline: u64,
) -> Vec<u8> {
    call(
        SWAP_EXACT_TOKENS_FOR_TOKENS,
        &[
            AbiParam::Uint(amount_in),
            AbiParam::Uint(amount_out_min),
            AbiParam::AddressArray(path),
            AbiParam::Address(to),
            AbiParam::Uint(U256::from(deadline)),
        ],
    )
}

/// Payable; the input amount travels as the transaction value.
pub fn swap_exact_eth_for_tokens(
    amount_out_min: U256,
    path: Vec<[u8; 20]>,
    to: [u8; 20],
    deadline: u64,
) -> Vec<u8> {
    call(
        SWAP_EXACT_ETH_FOR_TOKENS,
        &[
            AbiParam::Uint(amount_out_min),
            AbiParam::AddressArray(path),
            AbiParam::Address(to),
            AbiParam::Uint(U256::from(deadline)),
        ],
    )
}

pub fn swap_exact_tokens_for_eth(
    amount_in: U256,
    amount_out_min: U256,
    path: Vec<[u8; 20]>,
    to: [u8; 20],
    deadline: u64,
) -> Vec<u8> {
    call(
        SWAP_EXACT_TOKENS_FOR_ETH,
        &[
            AbiParam::Uint(amount_in),
            AbiParam::Uint(amount_out_min),
            AbiParam::AddressArray(path),
            AbiParam::Address(to),
            AbiParam::Uint(U256::from(deadline)),
        ],
    )
}

/// SwapRouter02 single-pool swap. The params tuple is static, so it encodes
/// inline as seven words.
pub fn exact_input_single(
    token_in: [u8; 20],
    token_out: [u8; 20],
    fee: u32,
    recipient: [u8; 20],
    amount_in: U256,
    amount_out_minimum: U256,
) -> Vec<u8> {
    call(
        EXACT_INPUT_SINGLE,
        &[
            AbiParam::Address(token_in),
            AbiParam::Address(token_out),
            AbiParam::Uint(U256::from(fee)),
            AbiParam::Address(recipient),
            AbiParam::Uint(amount_in),
            AbiParam::Uint(amount_out_minimum),
            AbiParam::Uint(U256::ZERO),
        ],
    )
}

#[allow(clippy::too_many_arguments)]
pub fn add_liquidity(
    token_a: [u8; 20],
    token_b: [u8; 20],
    amount_a: U256,
    amount_b: U256,
    amount_a_min: U256,
    amount_b_min: U256,
    to: [u8; 20],
    deadline: u64,
) -> Vec<u8> {
    call(
        ADD_LIQUIDITY,
        &[
            AbiParam::Address(token_a),
            AbiParam::Address(token_b),
            AbiParam::Uint(amount_a),
            AbiParam::Uint(amount_b),
            AbiParam::Uint(amount_a_min),
            AbiParam::Uint(amount_b_min),
            AbiParam::Address(to),
            AbiParam::Uint(U256::from(deadline)),
        ],
    )
}

/// Payable; the native amount travels as the transaction value.
pub fn add_liquidity_eth(
    token: [u8; 20],
    amount_token: U256,
    amount_token_min: U256,
    amount_eth_min: U256,
    to: [u8; 20],
    deadline: u64,
) -> Vec<u8> {
    call(
        ADD_LIQUIDITY_ETH,
        &[
            AbiParam::Address(token),
            AbiParam::Uint(amount_token),
            AbiParam::Uint(amount_token_min),
            AbiParam::Uint(amount_eth_min),
            AbiParam::Address(to),
            AbiParam::Uint(U256::from(deadline)),
        ],
    )
}

pub fn remove_liquidity(
    token_a: [u8; 20],
    token_b: [u8; 20],
    liquidity: U256,
    to: [u8; 20],
    deadline: u64,
) -> Vec<u8> {
    call(
        REMOVE_LIQUIDITY,
        &[
            AbiParam::Address(token_a),
            AbiParam::Address(token_b),
            AbiParam::Uint(liquidity),
            AbiParam::Uint(U256::ZERO),
            AbiParam::Uint(U256::ZERO),
            AbiParam::Address(to),
            AbiParam::Uint(U256::from(deadline)),
        ],
    )
}

pub fn aave_supply(asset: [u8; 20], amount: U256, on_behalf_of: [u8; 20]) -> Vec<u8> {
    call(
        AAVE_SUPPLY,
        &[
            AbiParam::Address(asset),
            AbiParam::Uint(amount),
            AbiParam::Address(on_behalf_of),
            AbiParam::Uint(U256::ZERO),
        ],
    )
}

/// `U256::MAX` withdraws the whole position.
pub fn aave_withdraw(asset: [u8; 20], amount: U256, to: [u8; 20]) -> Vec<u8> {
    call(
        AAVE_WITHDRAW,
        &[
            AbiParam::Address(asset),
            AbiParam::Uint(amount),
            AbiParam::Address(to),
        ],
    )
}

/// Payable; no referral.
pub fn lido_submit() -> Vec<u8> {
    call(LIDO_SUBMIT, &[AbiParam::Address([0u8; 20])])
}

pub fn lido_request_withdrawals(amounts: Vec<U256>, owner: [u8; 20]) -> Vec<u8> {
    call(
        LIDO_REQUEST_WITHDRAWALS,
        &[AbiParam::UintArray(amounts), AbiParam::Address(owner)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(data: &[u8], index: usize) -> &[u8] {
        &data[4 + index * 32..4 + (index + 1) * 32]
    }

    #[test]
    fn well_known_selectors() {
        assert_eq!(selector(SWAP_EXACT_TOKENS_FOR_TOKENS), [0x38, 0xed, 0x17, 0x39]);
        assert_eq!(selector(SWAP_EXACT_ETH_FOR_TOKENS), [0x7f, 0xf3, 0x6a, 0xb5]);
        assert_eq!(selector(SWAP_EXACT_TOKENS_FOR_ETH), [0x18, 0xcb, 0xaf, 0xe5]);
        assert_eq!(selector(EXACT_INPUT_SINGLE), [0x04, 0xe4, 0x5a, 0xaf]);
        assert_eq!(selector(ADD_LIQUIDITY), [0xe8, 0xe3, 0x37, 0x00]);
        assert_eq!(selector(ADD_LIQUIDITY_ETH), [0xf3, 0x05, 0xd7, 0x19]);
        assert_eq!(selector(REMOVE_LIQUIDITY), [0xba, 0xa2, 0xab, 0xde]);
        assert_eq!(selector(AAVE_SUPPLY), [0x61, 0x7b, 0xa0, 0x37]);
        assert_eq!(selector(AAVE_WITHDRAW), [0x69, 0x32, 0x8d, 0xec]);
        assert_eq!(selector(LIDO_SUBMIT), [0xa1, 0x90, 0x3e, 0xab]);
    }

    #[test]
    fn token_swap_layout() {
        let path = vec![[0x11; 20], [0x22; 20]];
        let data = swap_exact_tokens_for_tokens(
            U256::from(1_000u64),
            U256::from(990u64),
            path,
            [0x33; 20],
            1_700_000_000,
        );
        // five head words, then the path: length and two addresses
        assert_eq!(data.len(), 4 + 32 * 8);
        assert_eq!(U256::from_be_slice(word(&data, 0)), U256::from(1_000u64));
        assert_eq!(U256::from_be_slice(word(&data, 1)), U256::from(990u64));
        assert_eq!(U256::from_be_slice(word(&data, 2)), U256::from(160u64));
        assert_eq!(&word(&data, 3)[12..], &[0x33; 20]);
        assert_eq!(U256::from_be_slice(word(&data, 4)), U256::from(1_700_000_000u64));
        assert_eq!(U256::from_be_slice(word(&data, 5)), U256::from(2u64));
        assert_eq!(&word(&data, 6)[12..], &[0x11; 20]);
        assert_eq!(&word(&data, 7)[12..], &[0x22; 20]);
    }

    #[test]
    fn exact_input_single_is_static() {
        let data = exact_input_single(
            [0x11; 20],
            [0x22; 20],
            3_000,
            [0x33; 20],
            U256::from(5u64),
            U256::from(4u64),
        );
        assert_eq!(data.len(), 4 + 32 * 7);
        assert_eq!(U256::from_be_slice(word(&data, 2)), U256::from(3_000u64));
        assert_eq!(word(&data, 6), &[0u8; 32]);
    }

    #[test]
    fn lido_withdrawal_request_layout() {
        let data = lido_request_withdrawals(vec![U256::from(7u64)], [0x44; 20]);
        assert_eq!(data.len(), 4 + 32 * 4);
        assert_eq!(U256::from_be_slice(word(&data, 0)), U256::from(64u64));
        assert_eq!(&word(&data, 1)[12..], &[0x44; 20]);
        assert_eq!(U256::from_be_slice(word(&data, 2)), U256::from(1u64));
        assert_eq!(U256::from_be_slice(word(&data, 3)), U256::from(7u64));
    }

    #[test]
    fn aave_withdraw_max() {
        let data = aave_withdraw([0x11; 20], U256::MAX, [0x22; 20]);
        assert_eq!(word(&data, 1), &[0xff; 32]);
    }
}
