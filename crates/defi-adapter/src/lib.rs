//! # defi-adapter
//!
//! Maps swap, liquidity, lending and staking requests onto contract calls
//! for Uniswap V2/V3, SushiSwap, Aave V3 and Lido, then builds or sends them
//! through a [`wallet_core::WalletEngine`].

pub mod adapter;
pub mod calldata;
pub mod error;
pub mod protocol;
pub mod request;

pub use adapter::{Allowance, DeFiAdapter, Plan, ProtocolCall};
pub use error::DeFiError;
pub use protocol::{Protocol, ProtocolBook, ProtocolConfig};
pub use request::{
    AddLiquidityRequest, DeFiRequest, DepositRequest, RemoveLiquidityRequest, StakeRequest,
    SwapRequest, UnstakeRequest, WithdrawRequest, DEFAULT_DEADLINE_SECS, DEFAULT_SLIPPAGE_BPS,
};
