//! Hex quantities and node objects.

use alloy_primitives::U256;
use serde::Deserialize;
use serde_json::{json, Value};
use wallet_core::{FeeHistory, NetworkError, Receipt, Transaction, TransactionInfo};

/// `0x`-prefixed minimal hex, as JSON-RPC quantities are written.
pub fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

pub fn u256_quantity(value: U256) -> String {
    format!("0x{value:x}")
}

pub fn data_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn digits(raw: &str) -> Result<&str, NetworkError> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(digits) if !digits.is_empty() => Ok(digits),
        _ => Err(NetworkError::InvalidResponse(format!("malformed quantity '{raw}'"))),
    }
}

pub fn parse_u64(raw: &str) -> Result<u64, NetworkError> {
    u64::from_str_radix(digits(raw)?, 16)
        .map_err(|e| NetworkError::InvalidResponse(format!("quantity '{raw}': {e}")))
}

pub fn parse_u128(raw: &str) -> Result<u128, NetworkError> {
    u128::from_str_radix(digits(raw)?, 16)
        .map_err(|e| NetworkError::InvalidResponse(format!("quantity '{raw}': {e}")))
}

pub fn parse_u256(raw: &str) -> Result<U256, NetworkError> {
    U256::from_str_radix(digits(raw)?, 16)
        .map_err(|e| NetworkError::InvalidResponse(format!("quantity '{raw}': {e}")))
}

/// Unformatted data. `0x` alone is empty.
pub fn parse_data(raw: &str) -> Result<Vec<u8>, NetworkError> {
    let body = raw
        .strip_prefix("0x")
        .ok_or_else(|| NetworkError::InvalidResponse(format!("data without 0x prefix: '{raw}'")))?;
    hex::decode(body).map_err(|e| NetworkError::InvalidResponse(format!("data: {e}")))
}

/// Call object for `eth_call` / `eth_estimateGas`. Fees are left to the node.
pub fn call_object(tx: &Transaction) -> Result<Value, NetworkError> {
    let value = tx
        .value_u256()
        .map_err(|e| NetworkError::TransactionFailed(e.to_string()))?;
    Ok(json!({
        "from": tx.from,
        "to": tx.to,
        "value": u256_quantity(value),
        "data": data_hex(&tx.data),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawReceipt {
    transaction_hash: String,
    block_number: String,
    block_hash: String,
    gas_used: String,
    #[serde(default)]
    effective_gas_price: Option<String>,
    /// Absent on pre-Byzantium receipts.
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    logs: Vec<Value>,
}

impl RawReceipt {
    pub(crate) fn decode(self) -> Result<Receipt, NetworkError> {
        let success = match self.status.as_deref() {
            None => true,
            Some(status) => parse_u64(status)? == 1,
        };
        Ok(Receipt {
            tx_hash: self.transaction_hash,
            block_number: parse_u64(&self.block_number)?,
            block_hash: self.block_hash,
            gas_used: parse_u64(&self.gas_used)?,
            effective_gas_price: self
                .effective_gas_price
                .as_deref()
                .map(parse_u128)
                .transpose()?,
            success,
            contract_address: self.contract_address,
            logs: self.logs.len(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
    nonce: String,
    #[serde(default)]
    block_number: Option<String>,
    gas: String,
    input: String,
}

impl RawTransaction {
    pub(crate) fn involves(&self, address: &str) -> bool {
        self.from.eq_ignore_ascii_case(address)
            || self
                .to
                .as_deref()
                .is_some_and(|to| to.eq_ignore_ascii_case(address))
    }

    pub(crate) fn decode(self) -> Result<TransactionInfo, NetworkError> {
        Ok(TransactionInfo {
            hash: self.hash,
            from: self.from,
            to: self.to,
            value: parse_u256(&self.value)?,
            nonce: parse_u64(&self.nonce)?,
            block_number: self.block_number.as_deref().map(parse_u64).transpose()?,
            gas_limit: parse_u64(&self.gas)?,
            input: parse_data(&self.input)?,
        })
    }
}

/// Block fetched with full transaction objects.
#[derive(Debug, Deserialize)]
pub(crate) struct RawBlock {
    #[serde(default)]
    pub(crate) transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFeeHistory {
    oldest_block: String,
    #[serde(default)]
    base_fee_per_gas: Vec<String>,
    #[serde(default)]
    gas_used_ratio: Vec<f64>,
    #[serde(default)]
    reward: Vec<Vec<String>>,
}

impl RawFeeHistory {
    pub(crate) fn decode(self) -> Result<FeeHistory, NetworkError> {
        Ok(FeeHistory {
            oldest_block: parse_u64(&self.oldest_block)?,
            base_fee_per_gas: self
                .base_fee_per_gas
                .iter()
                .map(|fee| parse_u128(fee))
                .collect::<Result<Vec<_>, NetworkError>>()?,
            gas_used_ratio: self.gas_used_ratio,
            reward: self
                .reward
                .iter()
                .map(|block| {
                    block
                        .iter()
                        .map(|tip| parse_u128(tip))
                        .collect::<Result<Vec<_>, NetworkError>>()
                })
                .collect::<Result<Vec<_>, NetworkError>>()?,
        })
    }
}
