//! Structural checks run before any signing or network side effect.

use alloy_primitives::U256;
use chain_evm::address::parse_address;

use crate::error::ValidationError;
use crate::network::Network;
use crate::transaction::{evm_access_list, FeeModel, Transaction, TxKind};

/// Intrinsic gas of a plain transfer.
pub const MIN_GAS_LIMIT: u64 = 21_000;
/// Mainnet block gas limit.
pub const MAX_GAS_LIMIT: u64 = 30_000_000;
/// Node txpools reject larger payloads.
pub const MAX_DATA_BYTES: usize = 128 * 1024;

/// Parses a non-negative decimal integer string into wei.
pub fn parse_value(value: &str) -> Result<U256, ValidationError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidValue(value.to_string()));
    }
    U256::from_str_radix(value, 10).map_err(|_| ValidationError::InvalidValue(value.to_string()))
}

/// Validates a transaction's shape. Pure: the record is never modified.
pub fn validate(tx: &Transaction) -> Result<(), ValidationError> {
    check_address("from", &tx.from)?;
    check_address("to", &tx.to)?;
    parse_value(&tx.value)?;

    if !(MIN_GAS_LIMIT..=MAX_GAS_LIMIT).contains(&tx.gas_limit) {
        return Err(ValidationError::InvalidGasLimit(tx.gas_limit));
    }

    match tx.fee {
        FeeModel::Legacy { gas_price } if gas_price == 0 => {
            return Err(ValidationError::InvalidFee("gas price must be positive".into()));
        }
        FeeModel::FeeMarket { max_fee, .. } if max_fee == 0 => {
            return Err(ValidationError::InvalidFee("max fee must be positive".into()));
        }
        FeeModel::FeeMarket {
            max_fee,
            max_priority_fee,
        } if max_priority_fee > max_fee => {
            return Err(ValidationError::InvalidFee(format!(
                "priority fee {max_priority_fee} exceeds max fee {max_fee}"
            )));
        }
        _ => {}
    }

    match (tx.kind, &tx.fee) {
        (TxKind::Legacy, FeeModel::Legacy { .. }) => {
            if !tx.access_list.is_empty() {
                return Err(ValidationError::FeeModelMismatch(
                    "legacy transactions cannot carry an access list".into(),
                ));
            }
        }
        (TxKind::AccessList, FeeModel::Legacy { .. }) | (TxKind::FeeMarket, FeeModel::FeeMarket { .. }) => {}
        (kind, fee) => {
            return Err(ValidationError::FeeModelMismatch(format!(
                "{} transaction with {fee:?}",
                kind.as_str()
            )));
        }
    }
    evm_access_list(&tx.access_list)?;

    if tx.data.len() > MAX_DATA_BYTES {
        return Err(ValidationError::InvalidData(format!(
            "{} bytes of call data exceeds {MAX_DATA_BYTES}",
            tx.data.len()
        )));
    }

    Ok(())
}

/// [`validate`] plus the checks that depend on the target network.
pub fn validate_for_network(tx: &Transaction, network: &Network) -> Result<(), ValidationError> {
    validate(tx)?;
    if tx.chain_id != network.chain_id {
        return Err(ValidationError::ChainMismatch {
            expected: network.chain_id,
            actual: tx.chain_id,
        });
    }
    if tx.kind == TxKind::FeeMarket && !network.supports_fee_market() {
        return Err(ValidationError::UnsupportedFeeMarket(network.chain_id));
    }
    Ok(())
}

fn check_address(field: &'static str, value: &str) -> Result<(), ValidationError> {
    parse_address(value)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}
