//! EVM chain primitives for the wallet engine.
//!
//! This crate provides:
//! - EIP-55 address derivation, parsing and checksum validation
//! - Legacy (EIP-155), access-list (EIP-2930) and fee-market (EIP-1559)
//!   transaction encoding, signing digests and signature recovery
//! - ERC-20 calldata encoding (transfer, approve, balanceOf)
//! - Minimal ABI encoding with dynamic arrays and bytes

pub mod abi;
pub mod address;
pub mod erc20;
pub mod error;
pub mod transaction;

pub use alloy_primitives::U256;

use sha3::{Digest, Keccak256};

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}
