//! Transaction records and their one-way state machine.

use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::U256;
use chain_evm::address::parse_address;
use chain_evm::transaction::{
    transaction_hash, AccessListEntry, EvmFee, EvmTransaction, RecoverableSignature,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, WalletError};
use crate::validation::parse_value;

/// Gas pricing. Legacy and fee-market fields cannot coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FeeModel {
    Legacy { gas_price: u128 },
    FeeMarket { max_fee: u128, max_priority_fee: u128 },
}

impl FeeModel {
    /// Upper bound on wei paid per unit of gas.
    pub fn max_price_per_gas(&self) -> u128 {
        match self {
            FeeModel::Legacy { gas_price } => *gas_price,
            FeeModel::FeeMarket { max_fee, .. } => *max_fee,
        }
    }

    /// Every price raised by `percent`, rounding up.
    pub fn bumped(&self, percent: u32) -> FeeModel {
        let bump = |price: u128| {
            let scaled = price.saturating_mul(100 + u128::from(percent));
            scaled.div_ceil(100).max(price.saturating_add(1))
        };
        match *self {
            FeeModel::Legacy { gas_price } => FeeModel::Legacy {
                gas_price: bump(gas_price),
            },
            FeeModel::FeeMarket {
                max_fee,
                max_priority_fee,
            } => FeeModel::FeeMarket {
                max_fee: bump(max_fee),
                max_priority_fee: bump(max_priority_fee),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Legacy,
    /// EIP-1559.
    FeeMarket,
    /// EIP-2930.
    AccessList,
}

impl TxKind {
    /// The kind implied by a fee model and whether an access list is present.
    pub fn infer(fee: &FeeModel, has_access_list: bool) -> TxKind {
        match (fee, has_access_list) {
            (FeeModel::FeeMarket { .. }, _) => TxKind::FeeMarket,
            (FeeModel::Legacy { .. }, true) => TxKind::AccessList,
            (FeeModel::Legacy { .. }, false) => TxKind::Legacy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Legacy => "legacy",
            TxKind::FeeMarket => "fee_market",
            TxKind::AccessList => "access_list",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
            TxStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EIP-2930 entry as hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessListItem {
    pub address: String,
    pub storage_keys: Vec<String>,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: String,
    pub gas_used: u64,
    pub effective_gas_price: Option<u128>,
    pub success: bool,
    pub contract_address: Option<String>,
    pub logs: usize,
}

/// An unsigned or in-flight transaction.
///
/// Records are immutable; each transition consumes the record and returns the
/// next one, or an error if the move is not allowed from the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    /// Set once broadcast.
    pub hash: Option<String>,
    pub from: String,
    pub to: String,
    /// Decimal wei.
    pub value: String,
    pub gas_limit: u64,
    pub fee: FeeModel,
    pub nonce: u64,
    pub data: Vec<u8>,
    pub chain_id: u64,
    pub status: TxStatus,
    pub kind: TxKind,
    pub access_list: Vec<AccessListItem>,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<u128>,
    pub receipt: Option<Receipt>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
}

impl Transaction {
    /// A pending plain transfer with a 21000 gas limit and nonce 0.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        value: impl Into<String>,
        chain_id: u64,
        fee: FeeModel,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            hash: None,
            from: from.into(),
            to: to.into(),
            value: value.into(),
            gas_limit: 21_000,
            fee,
            nonce: 0,
            data: Vec::new(),
            chain_id,
            status: TxStatus::Pending,
            kind: TxKind::infer(&fee, false),
            access_list: Vec::new(),
            block_number: None,
            block_hash: None,
            gas_used: None,
            effective_gas_price: None,
            receipt: None,
            created_at: Utc::now(),
            confirmed_at: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Replaces the fee model and re-derives the kind.
    pub fn with_fee(mut self, fee: FeeModel) -> Self {
        self.fee = fee;
        self.kind = TxKind::infer(&fee, !self.access_list.is_empty());
        self
    }

    pub fn with_access_list(mut self, access_list: Vec<AccessListItem>) -> Self {
        self.kind = TxKind::infer(&self.fee, !access_list.is_empty());
        self.access_list = access_list;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.hash.is_some()
    }

    pub fn value_u256(&self) -> Result<U256, ValidationError> {
        parse_value(&self.value)
    }

    /// `value + gas_limit * max_price_per_gas`, saturating.
    pub fn max_cost(&self) -> Result<U256, ValidationError> {
        let gas = U256::from(self.gas_limit).saturating_mul(U256::from(self.fee.max_price_per_gas()));
        Ok(self.value_u256()?.saturating_add(gas))
    }

    /// Records the node-assigned hash. Only a pending, unbroadcast record
    /// accepts one.
    pub fn broadcasted(mut self, hash: impl Into<String>) -> Result<Self, WalletError> {
        self.require_pending("broadcast")?;
        if self.hash.is_some() {
            return Err(WalletError::InvalidTransition {
                from: "broadcast",
                to: "broadcast",
            });
        }
        self.hash = Some(hash.into());
        Ok(self)
    }

    pub fn confirm(mut self, receipt: Receipt, at: DateTime<Utc>) -> Result<Self, WalletError> {
        self.require_pending(TxStatus::Confirmed.as_str())?;
        self.status = TxStatus::Confirmed;
        self.confirmed_at = Some(at);
        self.apply_receipt(receipt);
        Ok(self)
    }

    /// Marks the transaction failed, keeping the receipt when it was mined
    /// and reverted.
    pub fn fail(mut self, receipt: Option<Receipt>, reason: &str) -> Result<Self, WalletError> {
        self.require_pending(TxStatus::Failed.as_str())?;
        self.status = TxStatus::Failed;
        if let Some(receipt) = receipt {
            self.apply_receipt(receipt);
        }
        self.metadata
            .insert("failure_reason".to_string(), reason.to_string());
        Ok(self)
    }

    /// Abandons a transaction that never left the engine.
    pub fn cancel(mut self) -> Result<Self, WalletError> {
        self.require_pending(TxStatus::Cancelled.as_str())?;
        if self.hash.is_some() {
            return Err(WalletError::InvalidTransition {
                from: "broadcast",
                to: TxStatus::Cancelled.as_str(),
            });
        }
        self.status = TxStatus::Cancelled;
        Ok(self)
    }

    /// The chain-level encoding of this record.
    pub fn to_evm(&self) -> Result<EvmTransaction, ValidationError> {
        let to = parse_address(&self.to).map_err(|_| ValidationError::InvalidAddress {
            field: "to",
            value: self.to.clone(),
        })?;

        let fee = match (self.kind, self.fee) {
            (TxKind::Legacy, FeeModel::Legacy { gas_price }) if self.access_list.is_empty() => {
                EvmFee::Legacy { gas_price }
            }
            (TxKind::AccessList, FeeModel::Legacy { gas_price }) => EvmFee::AccessList {
                gas_price,
                access_list: evm_access_list(&self.access_list)?,
            },
            (
                TxKind::FeeMarket,
                FeeModel::FeeMarket {
                    max_fee,
                    max_priority_fee,
                },
            ) => EvmFee::DynamicFee {
                max_fee_per_gas: max_fee,
                max_priority_fee_per_gas: max_priority_fee,
                access_list: evm_access_list(&self.access_list)?,
            },
            (kind, _) => {
                return Err(ValidationError::FeeModelMismatch(format!(
                    "{} transaction with {:?} fee and {} access-list entries",
                    kind.as_str(),
                    self.fee,
                    self.access_list.len()
                )))
            }
        };

        Ok(EvmTransaction {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            to,
            value: self.value_u256()?,
            data: self.data.clone(),
            fee,
        })
    }

    fn require_pending(&self, to: &'static str) -> Result<(), WalletError> {
        if self.status == TxStatus::Pending {
            Ok(())
        } else {
            Err(WalletError::InvalidTransition {
                from: self.status.as_str(),
                to,
            })
        }
    }

    fn apply_receipt(&mut self, receipt: Receipt) {
        self.block_number = Some(receipt.block_number);
        self.block_hash = Some(receipt.block_hash.clone());
        self.gas_used = Some(receipt.gas_used);
        self.effective_gas_price = receipt.effective_gas_price;
        self.receipt = Some(receipt);
    }
}

pub(crate) fn evm_access_list(
    items: &[AccessListItem],
) -> Result<Vec<AccessListEntry>, ValidationError> {
    items
        .iter()
        .map(|item| {
            let address = parse_address(&item.address).map_err(|_| ValidationError::InvalidAddress {
                field: "access list",
                value: item.address.clone(),
            })?;
            let storage_keys = item
                .storage_keys
                .iter()
                .map(|key| parse_storage_key(key))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AccessListEntry {
                address,
                storage_keys,
            })
        })
        .collect()
}

fn parse_storage_key(key: &str) -> Result<[u8; 32], ValidationError> {
    let invalid = || ValidationError::InvalidData(format!("bad storage key {key}"));
    let hex_part = key.strip_prefix("0x").ok_or_else(invalid)?;
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut out).map_err(|_| invalid())?;
    Ok(out)
}

/// A signed transaction. The hash is always recomputed from `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: RecoverableSignature,
    /// Broadcast bytes.
    pub raw: Vec<u8>,
    /// Checksummed signer address.
    pub signer: String,
    pub signed_at: DateTime<Utc>,
}

impl SignedTransaction {
    /// `0x`-prefixed Keccak-256 of the raw payload.
    pub fn hash(&self) -> String {
        transaction_hash(&self.raw)
    }

    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    pub fn chain_id(&self) -> u64 {
        self.transaction.chain_id
    }
}
