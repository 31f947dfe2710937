use thiserror::Error;
use wallet_core::WalletError;

use crate::protocol::Protocol;

#[derive(Debug, Error)]
pub enum DeFiError {
    #[error("invalid swap request: {0}")]
    InvalidSwapRequest(String),

    #[error("invalid liquidity request: {0}")]
    InvalidLiquidityRequest(String),

    #[error("invalid deposit request: {0}")]
    InvalidDepositRequest(String),

    #[error("invalid withdraw request: {0}")]
    InvalidWithdrawRequest(String),

    #[error("invalid stake request: {0}")]
    InvalidStakeRequest(String),

    #[error("invalid unstake request: {0}")]
    InvalidUnstakeRequest(String),

    #[error("{protocol} does not support {action} on chain {chain_id}")]
    UnsupportedProtocol {
        protocol: Protocol,
        action: &'static str,
        chain_id: u64,
    },

    #[error("unknown token '{identifier}' on chain {chain_id}")]
    UnknownToken { chain_id: u64, identifier: String },

    #[error("invalid protocol config: {0}")]
    Config(String),

    #[error(transparent)]
    Build(#[from] WalletError),
}

impl From<toml::de::Error> for DeFiError {
    fn from(e: toml::de::Error) -> Self {
        DeFiError::Config(e.to_string())
    }
}
