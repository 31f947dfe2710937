use alloy_primitives::U256;

use crate::abi::{encode_function_call, AbiParam};
use crate::address::parse_address;
use crate::error::EthError;

/// Function selector for `transfer(address,uint256)`: `0xa9059cbb`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Function selector for `balanceOf(address)`: `0x70a08231`.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Function selector for `approve(address,uint256)`: `0x095ea7b3`.
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// Encodes `transfer(to, amount)`; 68 bytes of calldata.
pub fn encode_transfer(to: &str, amount: U256) -> Result<Vec<u8>, EthError> {
    let params = [AbiParam::Address(parse_address(to)?), AbiParam::Uint(amount)];
    Ok(encode_function_call(TRANSFER_SELECTOR, &params))
}

/// Encodes `balanceOf(owner)`; 36 bytes of calldata.
pub fn encode_balance_of(owner: &str) -> Result<Vec<u8>, EthError> {
    let params = [AbiParam::Address(parse_address(owner)?)];
    Ok(encode_function_call(BALANCE_OF_SELECTOR, &params))
}

/// Encodes `approve(spender, amount)`; 68 bytes of calldata.
pub fn encode_approve(spender: &str, amount: U256) -> Result<Vec<u8>, EthError> {
    let params = [
        AbiParam::Address(parse_address(spender)?),
        AbiParam::Uint(amount),
    ];
    Ok(encode_function_call(APPROVE_SELECTOR, &params))
}
