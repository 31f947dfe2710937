use alloy_primitives::U256;
use alloy_rlp::{Encodable, RlpEncodable};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use zeroize::Zeroize;

use crate::address::pubkey_to_address;
use crate::error::EthError;
use crate::keccak256;

/// EIP-2718 type byte for access-list transactions.
pub const ACCESS_LIST_TX_TYPE: u8 = 0x01;
/// EIP-2718 type byte for fee-market transactions.
pub const DYNAMIC_FEE_TX_TYPE: u8 = 0x02;

/// One entry of an EIP-2930 access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListEntry {
    pub address: [u8; 20],
    pub storage_keys: Vec<[u8; 32]>,
}

/// Fee fields of a transaction; the variant decides the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvmFee {
    /// Pre-2718 transaction, replay-protected with EIP-155.
    Legacy { gas_price: u128 },
    /// EIP-2930 (type 1).
    AccessList {
        gas_price: u128,
        access_list: Vec<AccessListEntry>,
    },
    /// EIP-1559 (type 2).
    DynamicFee {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
        access_list: Vec<AccessListEntry>,
    },
}

impl EvmFee {
    /// EIP-2718 type byte, or `None` for legacy.
    pub fn tx_type(&self) -> Option<u8> {
        match self {
            EvmFee::Legacy { .. } => None,
            EvmFee::AccessList { .. } => Some(ACCESS_LIST_TX_TYPE),
            EvmFee::DynamicFee { .. } => Some(DYNAMIC_FEE_TX_TYPE),
        }
    }

    /// Upper bound on the price paid per unit of gas.
    pub fn max_price_per_gas(&self) -> u128 {
        match self {
            EvmFee::Legacy { gas_price } | EvmFee::AccessList { gas_price, .. } => *gas_price,
            EvmFee::DynamicFee {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// An unsigned EVM transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub to: [u8; 20],
    /// Value in wei.
    pub value: U256,
    pub data: Vec<u8>,
    pub fee: EvmFee,
}

/// A secp256k1 signature with its recovery bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub y_parity: u8,
}

impl RecoverableSignature {
    /// Legacy `v`: `y + 35 + 2 * chain_id` (EIP-155).
    pub fn eip155_v(&self, chain_id: u64) -> u128 {
        u128::from(self.y_parity) + 35 + 2 * u128::from(chain_id)
    }

    /// 65-byte `r || s || v` with `v` in {27, 28}.
    pub fn to_rsv_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.y_parity + 27;
        out
    }

    /// Low-s form (EIP-2). A high `s` becomes `n - s` and the parity flips.
    pub fn normalized(self) -> Result<Self, EthError> {
        let (signature, _) = self.to_k256()?;
        let Some(low) = signature.normalize_s() else {
            return Ok(self);
        };
        let mut s = [0u8; 32];
        s.copy_from_slice(&low.s().to_bytes());
        Ok(Self {
            r: self.r,
            s,
            y_parity: self.y_parity ^ 1,
        })
    }

    fn to_k256(self) -> Result<(Signature, RecoveryId), EthError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature = Signature::from_slice(&rs)
            .map_err(|e| EthError::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.y_parity)
            .ok_or_else(|| EthError::InvalidSignature("recovery id must be 0 or 1".into()))?;
        Ok((signature, recovery_id))
    }
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvmTransaction {
    /// Broadcast bytes: legacy RLP, or `type || rlp(..)`.
    pub raw_tx: Vec<u8>,
    /// Keccak-256 of `raw_tx`, 0x-prefixed.
    pub tx_hash: String,
    pub signature: RecoverableSignature,
}

/// Bytes whose Keccak-256 is signed.
///
/// - legacy: `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`
/// - type 1: `0x01 || rlp([chainId, nonce, gasPrice, gas, to, value, data, accessList])`
/// - type 2: `0x02 || rlp([chainId, nonce, maxPriority, maxFee, gas, to, value, data, accessList])`
pub fn signing_payload(tx: &EvmTransaction) -> Vec<u8> {
    let mut out = Vec::new();
    match &tx.fee {
        EvmFee::Legacy { gas_price } => {
            LegacySigningFields {
                nonce: tx.nonce,
                gas_price: *gas_price,
                gas_limit: tx.gas_limit,
                to: RlpAddress(tx.to),
                value: RlpU256::from(tx.value),
                data: RlpBytes(&tx.data),
                chain_id: tx.chain_id,
                empty_r: 0,
                empty_s: 0,
            }
            .encode(&mut out);
        }
        EvmFee::AccessList {
            gas_price,
            access_list,
        } => {
            out.push(ACCESS_LIST_TX_TYPE);
            AccessListFields {
                chain_id: tx.chain_id,
                nonce: tx.nonce,
                gas_price: *gas_price,
                gas_limit: tx.gas_limit,
                to: RlpAddress(tx.to),
                value: RlpU256::from(tx.value),
                data: RlpBytes(&tx.data),
                access_list: rlp_access_list(access_list),
            }
            .encode(&mut out);
        }
        EvmFee::DynamicFee {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            access_list,
        } => {
            out.push(DYNAMIC_FEE_TX_TYPE);
            DynamicFeeFields {
                chain_id: tx.chain_id,
                nonce: tx.nonce,
                max_priority_fee_per_gas: *max_priority_fee_per_gas,
                max_fee_per_gas: *max_fee_per_gas,
                gas_limit: tx.gas_limit,
                to: RlpAddress(tx.to),
                value: RlpU256::from(tx.value),
                data: RlpBytes(&tx.data),
                access_list: rlp_access_list(access_list),
            }
            .encode(&mut out);
        }
    }
    out
}

/// Keccak-256 of [`signing_payload`].
pub fn signing_hash(tx: &EvmTransaction) -> [u8; 32] {
    keccak256(&signing_payload(tx))
}

/// Signs a 32-byte digest with a raw secp256k1 private key.
pub fn sign_hash(hash: &[u8; 32], private_key: &[u8; 32]) -> Result<RecoverableSignature, EthError> {
    let mut key_bytes = *private_key;
    let signing_key = SigningKey::from_bytes((&key_bytes).into())
        .map_err(|e| EthError::InvalidPrivateKey(e.to_string()));
    key_bytes.zeroize();
    let signing_key = signing_key?;

    let (signature, recovery_id): (Signature, RecoveryId) = signing_key
        .sign_prehash(hash)
        .map_err(|e| EthError::SigningError(e.to_string()))?;

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&signature.r().to_bytes());
    s.copy_from_slice(&signature.s().to_bytes());

    Ok(RecoverableSignature {
        r,
        s,
        y_parity: u8::from(recovery_id.is_y_odd()),
    })
}

/// Serialises `tx` with `signature` into broadcast bytes.
pub fn encode_signed(tx: &EvmTransaction, signature: &RecoverableSignature) -> Vec<u8> {
    let r = RlpU256(signature.r);
    let s = RlpU256(signature.s);
    let mut out = Vec::new();
    match &tx.fee {
        EvmFee::Legacy { gas_price } => {
            LegacySignedFields {
                nonce: tx.nonce,
                gas_price: *gas_price,
                gas_limit: tx.gas_limit,
                to: RlpAddress(tx.to),
                value: RlpU256::from(tx.value),
                data: RlpBytes(&tx.data),
                v: signature.eip155_v(tx.chain_id),
                r,
                s,
            }
            .encode(&mut out);
        }
        EvmFee::AccessList {
            gas_price,
            access_list,
        } => {
            out.push(ACCESS_LIST_TX_TYPE);
            SignedAccessListFields {
                chain_id: tx.chain_id,
                nonce: tx.nonce,
                gas_price: *gas_price,
                gas_limit: tx.gas_limit,
                to: RlpAddress(tx.to),
                value: RlpU256::from(tx.value),
                data: RlpBytes(&tx.data),
                access_list: rlp_access_list(access_list),
                y_parity: signature.y_parity,
                r,
                s,
            }
            .encode(&mut out);
        }
        EvmFee::DynamicFee {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            access_list,
        } => {
            out.push(DYNAMIC_FEE_TX_TYPE);
            SignedDynamicFeeFields {
                chain_id: tx.chain_id,
                nonce: tx.nonce,
                max_priority_fee_per_gas: *max_priority_fee_per_gas,
                max_fee_per_gas: *max_fee_per_gas,
                gas_limit: tx.gas_limit,
                to: RlpAddress(tx.to),
                value: RlpU256::from(tx.value),
                data: RlpBytes(&tx.data),
                access_list: rlp_access_list(access_list),
                y_parity: signature.y_parity,
                r,
                s,
            }
            .encode(&mut out);
        }
    }
    out
}

/// Signs `tx` and returns the raw bytes together with the transaction hash.
pub fn sign_transaction(
    tx: &EvmTransaction,
    private_key: &[u8; 32],
) -> Result<SignedEvmTransaction, EthError> {
    let signature = sign_hash(&signing_hash(tx), private_key)?;
    let raw_tx = encode_signed(tx, &signature);
    let tx_hash = transaction_hash(&raw_tx);
    Ok(SignedEvmTransaction {
        raw_tx,
        tx_hash,
        signature,
    })
}

/// `0x`-prefixed Keccak-256 of broadcast bytes.
pub fn transaction_hash(raw_tx: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(raw_tx)))
}

/// Recovers the checksummed address that produced `signature` over `tx`.
pub fn recover_signer(
    tx: &EvmTransaction,
    signature: &RecoverableSignature,
) -> Result<String, EthError> {
    recover_address(&signing_hash(tx), signature)
}

/// Recovers the checksummed signer address of a 32-byte digest.
pub fn recover_address(
    hash: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<String, EthError> {
    let (sig, recovery_id) = signature.to_k256()?;
    let verifying_key = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id)
        .map_err(|e| EthError::InvalidSignature(e.to_string()))?;
    let pubkey = PublicKey::from(&verifying_key);
    pubkey_to_address(pubkey.to_encoded_point(false).as_bytes())
}

/// EIP-191 `personal_sign` digest:
/// `keccak256("\x19Ethereum Signed Message:\n" || len || message)`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut buf = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    buf.extend_from_slice(message);
    keccak256(&buf)
}

/// Signs `message` with EIP-191 and returns the 65-byte `r || s || v` form.
pub fn sign_message(message: &[u8], private_key: &[u8; 32]) -> Result<[u8; 65], EthError> {
    let signature = sign_hash(&personal_message_hash(message), private_key)?;
    Ok(signature.to_rsv_bytes())
}

// RLP field layouts

#[derive(RlpEncodable)]
struct LegacySigningFields<'a> {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: RlpU256,
    data: RlpBytes<'a>,
    chain_id: u64,
    empty_r: u8,
    empty_s: u8,
}

#[derive(RlpEncodable)]
struct LegacySignedFields<'a> {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: RlpU256,
    data: RlpBytes<'a>,
    v: u128,
    r: RlpU256,
    s: RlpU256,
}

#[derive(RlpEncodable)]
struct AccessListFields<'a> {
    chain_id: u64,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: RlpU256,
    data: RlpBytes<'a>,
    access_list: Vec<AccessListItem>,
}

#[derive(RlpEncodable)]
struct SignedAccessListFields<'a> {
    chain_id: u64,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: RlpU256,
    data: RlpBytes<'a>,
    access_list: Vec<AccessListItem>,
    y_parity: u8,
    r: RlpU256,
    s: RlpU256,
}

#[derive(RlpEncodable)]
struct DynamicFeeFields<'a> {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: RlpU256,
    data: RlpBytes<'a>,
    access_list: Vec<AccessListItem>,
}

#[derive(RlpEncodable)]
struct SignedDynamicFeeFields<'a> {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: RlpU256,
    data: RlpBytes<'a>,
    access_list: Vec<AccessListItem>,
    y_parity: u8,
    r: RlpU256,
    s: RlpU256,
}

#[derive(RlpEncodable)]
struct AccessListItem {
    address: RlpAddress,
    storage_keys: Vec<RlpFixedBytes<32>>,
}

fn rlp_access_list(entries: &[AccessListEntry]) -> Vec<AccessListItem> {
    entries
        .iter()
        .map(|entry| AccessListItem {
            address: RlpAddress(entry.address),
            storage_keys: entry.storage_keys.iter().copied().map(RlpFixedBytes).collect(),
        })
        .collect()
}

/// 20-byte address encoded as an RLP string.
struct RlpAddress([u8; 20]);

impl Encodable for RlpAddress {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.as_slice().encode(out);
    }

    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}

/// Calldata encoded as an RLP string (a `Vec<u8>` would encode as a list).
struct RlpBytes<'a>(&'a [u8]);

impl Encodable for RlpBytes<'_> {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.encode(out);
    }

    fn length(&self) -> usize {
        self.0.length()
    }
}

/// Big-endian 256-bit integer with leading zeros stripped.
struct RlpU256([u8; 32]);

impl RlpU256 {
    fn trimmed(&self) -> &[u8] {
        let start = self.0.iter().position(|&b| b != 0).unwrap_or(32);
        &self.0[start..]
    }
}

impl From<U256> for RlpU256 {
    fn from(value: U256) -> Self {
        Self(value.to_be_bytes::<32>())
    }
}

impl Encodable for RlpU256 {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.trimmed().encode(out);
    }

    fn length(&self) -> usize {
        self.trimmed().length()
    }
}

struct RlpFixedBytes<const N: usize>([u8; N]);

impl<const N: usize> Encodable for RlpFixedBytes<N> {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.as_slice().encode(out);
    }

    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}
