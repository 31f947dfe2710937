//! Minimal Solidity ABI encoding for contract calls.
//!
//! Covers the parameter shapes the wallet needs (addresses, uint256, bool,
//! address/uint256 arrays, dynamic bytes) without a full ABI parser.

use alloy_primitives::U256;

use crate::error::EthError;
use crate::keccak256;

/// A single ABI parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiParam {
    /// 20-byte address, left-padded to one word.
    Address([u8; 20]),
    /// Any `uintN`; all widths occupy one big-endian word.
    Uint(U256),
    Bool(bool),
    /// `address[]`, dynamic.
    AddressArray(Vec<[u8; 20]>),
    /// `uint256[]`, dynamic.
    UintArray(Vec<U256>),
    /// `bytes`, dynamic.
    Bytes(Vec<u8>),
}

impl AbiParam {
    fn is_dynamic(&self) -> bool {
        matches!(
            self,
            AbiParam::AddressArray(_) | AbiParam::UintArray(_) | AbiParam::Bytes(_)
        )
    }
}

/// First four bytes of the Keccak-256 of a canonical function signature,
/// e.g. `selector("transfer(address,uint256)") == [0xa9, 0x05, 0x9c, 0xbb]`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encodes `selector || head || tail` using the standard head/tail layout:
/// static parameters sit in the head, dynamic ones leave a byte offset there
/// and append their contents to the tail.
pub fn encode_function_call(selector: [u8; 4], params: &[AbiParam]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + params.len() * 32);
    out.extend_from_slice(&selector);
    out.extend_from_slice(&encode_params(params));
    out
}

/// Encodes a parameter tuple without a selector.
pub fn encode_params(params: &[AbiParam]) -> Vec<u8> {
    let head_len = params.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for param in params {
        if param.is_dynamic() {
            head.extend_from_slice(&uint_word(U256::from(head_len + tail.len())));
            tail.extend_from_slice(&encode_dynamic(param));
        } else {
            head.extend_from_slice(&encode_static(param));
        }
    }

    head.extend_from_slice(&tail);
    head
}

fn encode_static(param: &AbiParam) -> [u8; 32] {
    match param {
        AbiParam::Address(addr) => address_word(addr),
        AbiParam::Uint(value) => uint_word(*value),
        AbiParam::Bool(flag) => uint_word(U256::from(u8::from(*flag))),
        // Dynamic variants never reach here.
        _ => [0u8; 32],
    }
}

fn encode_dynamic(param: &AbiParam) -> Vec<u8> {
    match param {
        AbiParam::AddressArray(items) => {
            let mut out = uint_word(U256::from(items.len())).to_vec();
            for item in items {
                out.extend_from_slice(&address_word(item));
            }
            out
        }
        AbiParam::UintArray(items) => {
            let mut out = uint_word(U256::from(items.len())).to_vec();
            for item in items {
                out.extend_from_slice(&uint_word(*item));
            }
            out
        }
        AbiParam::Bytes(bytes) => {
            let mut out = uint_word(U256::from(bytes.len())).to_vec();
            out.extend_from_slice(bytes);
            let pad = (32 - bytes.len() % 32) % 32;
            out.extend(std::iter::repeat(0u8).take(pad));
            out
        }
        _ => Vec::new(),
    }
}

fn address_word(addr: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr);
    word
}

fn uint_word(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

/// Decodes a single uint256 return value (the first word of `data`).
pub fn decode_uint256(data: &[u8]) -> Result<U256, EthError> {
    if data.len() < 32 {
        return Err(EthError::EncodingError(format!(
            "expected at least 32 bytes for uint256, got {}",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..32]))
}
