//! Chain-agnostic RPC façade the engine talks to.
//!
//! Every call takes the target [`Network`] explicitly so callers can pin a
//! chain for the length of a build, sign and broadcast sequence.

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::error::NetworkError;
use crate::network::Network;
use crate::transaction::{FeeModel, Receipt, SignedTransaction, Transaction};

/// Fallback tip when fee history carries no rewards.
pub const DEFAULT_PRIORITY_FEE: u128 = 1_000_000_000;

/// A page of history, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    /// Blocks scanned per page.
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 0, size: 20 }
    }
}

/// A transaction as the node reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    pub hash: String,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    pub value: U256,
    pub nonce: u64,
    /// `None` while still in the mempool.
    pub block_number: Option<u64>,
    pub gas_limit: u64,
    pub input: Vec<u8>,
}

/// `eth_feeHistory` result, decoded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeeHistory {
    pub oldest_block: u64,
    /// One entry per block plus the next block's projection.
    pub base_fee_per_gas: Vec<u128>,
    pub gas_used_ratio: Vec<f64>,
    /// Per block, one tip per requested percentile.
    pub reward: Vec<Vec<u128>>,
}

impl FeeHistory {
    /// Projected base fee of the next block.
    pub fn next_base_fee(&self) -> u128 {
        self.base_fee_per_gas.last().copied().unwrap_or_default()
    }

    /// Median of the first-percentile tips, or [`DEFAULT_PRIORITY_FEE`].
    pub fn suggested_priority_fee(&self) -> u128 {
        let mut tips: Vec<u128> = self
            .reward
            .iter()
            .filter_map(|block| block.first().copied())
            .filter(|tip| *tip > 0)
            .collect();
        if tips.is_empty() {
            return DEFAULT_PRIORITY_FEE;
        }
        tips.sort_unstable();
        tips[tips.len() / 2]
    }

    /// `max_fee = 2 * base + tip`, enough headroom for six full blocks.
    pub fn suggest_fees(&self) -> FeeModel {
        let max_priority_fee = self.suggested_priority_fee();
        FeeModel::FeeMarket {
            max_fee: self
                .next_base_fee()
                .saturating_mul(2)
                .saturating_add(max_priority_fee),
            max_priority_fee,
        }
    }
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn get_balance(&self, address: &str, network: &Network) -> Result<U256, NetworkError>;

    /// Next nonce including mempool transactions.
    async fn get_nonce(&self, address: &str, network: &Network) -> Result<u64, NetworkError>;

    /// Nonce as of the latest mined block.
    async fn get_confirmed_nonce(
        &self,
        address: &str,
        network: &Network,
    ) -> Result<u64, NetworkError>;

    async fn estimate_gas(&self, tx: &Transaction, network: &Network) -> Result<u64, NetworkError>;

    async fn get_gas_price(&self, network: &Network) -> Result<u128, NetworkError>;

    async fn get_fee_history(
        &self,
        network: &Network,
        block_count: u64,
    ) -> Result<FeeHistory, NetworkError>;

    /// Submits the raw payload and returns the hash the node reports.
    async fn broadcast(
        &self,
        signed: &SignedTransaction,
        network: &Network,
    ) -> Result<String, NetworkError>;

    async fn get_receipt(&self, hash: &str, network: &Network)
        -> Result<Option<Receipt>, NetworkError>;

    async fn get_transaction(
        &self,
        hash: &str,
        network: &Network,
    ) -> Result<Option<TransactionInfo>, NetworkError>;

    async fn get_block_number(&self, network: &Network) -> Result<u64, NetworkError>;

    async fn get_transaction_history(
        &self,
        address: &str,
        network: &Network,
        page: Page,
    ) -> Result<Vec<TransactionInfo>, NetworkError>;

    /// Read-only contract call against the latest block.
    async fn call(&self, to: &str, data: &[u8], network: &Network) -> Result<Vec<u8>, NetworkError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_fee_is_median_of_nonzero_tips() {
        let history = FeeHistory {
            oldest_block: 1,
            base_fee_per_gas: vec![10, 12, 14],
            gas_used_ratio: vec![0.4, 0.6],
            reward: vec![vec![3], vec![0], vec![1], vec![7]],
        };
        assert_eq!(history.suggested_priority_fee(), 3);
        assert_eq!(history.next_base_fee(), 14);
        assert_eq!(
            history.suggest_fees(),
            FeeModel::FeeMarket {
                max_fee: 31,
                max_priority_fee: 3
            }
        );
    }

    #[test]
    fn empty_history_falls_back() {
        let history = FeeHistory::default();
        assert_eq!(history.suggested_priority_fee(), DEFAULT_PRIORITY_FEE);
        assert_eq!(
            history.suggest_fees(),
            FeeModel::FeeMarket {
                max_fee: DEFAULT_PRIORITY_FEE,
                max_priority_fee: DEFAULT_PRIORITY_FEE
            }
        );
    }
}
