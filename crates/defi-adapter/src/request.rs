//! High-level DeFi intents.
//!
//! Amounts are human-readable decimal strings in the token's own units
//! (`"1.5"` USDC is 1 500 000 base units). Token identifiers are symbols or
//! contract addresses.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use wallet_core::token::{parse_units, MAX_DECIMALS};

use crate::error::DeFiError;
use crate::protocol::Protocol;

/// Applied when a request sets no slippage tolerance.
pub const DEFAULT_SLIPPAGE_BPS: u32 = 50;
/// Seconds from build time when a request sets no deadline.
pub const DEFAULT_DEADLINE_SECS: u64 = 20 * 60;
const MAX_BPS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub from_token: String,
    pub to_token: String,
    pub amount: String,
    /// Quote for the output, in `to_token` units. Without one the minimum
    /// output is zero.
    #[serde(default)]
    pub expected_amount_out: Option<String>,
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
    /// Unix seconds.
    #[serde(default)]
    pub deadline: Option<u64>,
    pub protocol: Protocol,
}

impl SwapRequest {
    pub fn new(
        from_token: impl Into<String>,
        to_token: impl Into<String>,
        amount: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            from_token: from_token.into(),
            to_token: to_token.into(),
            amount: amount.into(),
            expected_amount_out: None,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            deadline: None,
            protocol,
        }
    }

    pub fn with_expected_out(mut self, amount: impl Into<String>, slippage_bps: u32) -> Self {
        self.expected_amount_out = Some(amount.into());
        self.slippage_bps = slippage_bps;
        self
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidityRequest {
    pub token_a: String,
    pub token_b: String,
    pub amount_a: String,
    pub amount_b: String,
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
    #[serde(default)]
    pub deadline: Option<u64>,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLiquidityRequest {
    pub token_a: String,
    pub token_b: String,
    /// Pool shares to burn, 18 decimals.
    pub liquidity: String,
    #[serde(default)]
    pub deadline: Option<u64>,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub token: String,
    pub amount: String,
    pub protocol: Protocol,
}

/// `amount` may be `"max"` to withdraw the whole position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub token: String,
    pub amount: String,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRequest {
    pub token: String,
    pub amount: String,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeRequest {
    pub token: String,
    pub amount: String,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeFiRequest {
    Swap(SwapRequest),
    AddLiquidity(AddLiquidityRequest),
    RemoveLiquidity(RemoveLiquidityRequest),
    Deposit(DepositRequest),
    Withdraw(WithdrawRequest),
    Stake(StakeRequest),
    Unstake(UnstakeRequest),
}

fn default_slippage() -> u32 {
    DEFAULT_SLIPPAGE_BPS
}

/// Positive decimal at the finest precision any token allows.
fn check_amount(field: &str, amount: &str) -> Result<(), String> {
    match parse_units(amount, MAX_DECIMALS) {
        Ok(value) if value > U256::ZERO => Ok(()),
        Ok(_) => Err(format!("{field} must be positive")),
        Err(_) => Err(format!("{field} '{amount}' is not a decimal amount")),
    }
}

fn check_token(field: &str, identifier: &str) -> Result<(), String> {
    if identifier.trim().is_empty() {
        return Err(format!("{field} is empty"));
    }
    Ok(())
}

fn check_slippage(slippage_bps: u32) -> Result<(), String> {
    if slippage_bps >= MAX_BPS {
        return Err(format!("slippage {slippage_bps} bps must be below {MAX_BPS}"));
    }
    Ok(())
}

impl DeFiRequest {
    pub fn protocol(&self) -> Protocol {
        match self {
            DeFiRequest::Swap(r) => r.protocol,
            DeFiRequest::AddLiquidity(r) => r.protocol,
            DeFiRequest::RemoveLiquidity(r) => r.protocol,
            DeFiRequest::Deposit(r) => r.protocol,
            DeFiRequest::Withdraw(r) => r.protocol,
            DeFiRequest::Stake(r) => r.protocol,
            DeFiRequest::Unstake(r) => r.protocol,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            DeFiRequest::Swap(_) => "swap",
            DeFiRequest::AddLiquidity(_) => "add_liquidity",
            DeFiRequest::RemoveLiquidity(_) => "remove_liquidity",
            DeFiRequest::Deposit(_) => "deposit",
            DeFiRequest::Withdraw(_) => "withdraw",
            DeFiRequest::Stake(_) => "stake",
            DeFiRequest::Unstake(_) => "unstake",
        }
    }

    /// The request-specific invalid error carrying `reason`.
    pub fn invalid(&self, reason: impl Into<String>) -> DeFiError {
        let reason = reason.into();
        match self {
            DeFiRequest::Swap(_) => DeFiError::InvalidSwapRequest(reason),
            DeFiRequest::AddLiquidity(_) | DeFiRequest::RemoveLiquidity(_) => {
                DeFiError::InvalidLiquidityRequest(reason)
            }
            DeFiRequest::Deposit(_) => DeFiError::InvalidDepositRequest(reason),
            DeFiRequest::Withdraw(_) => DeFiError::InvalidWithdrawRequest(reason),
            DeFiRequest::Stake(_) => DeFiError::InvalidStakeRequest(reason),
            DeFiRequest::Unstake(_) => DeFiError::InvalidUnstakeRequest(reason),
        }
    }

    /// Shape checks only: non-empty tokens, positive amounts, sane slippage.
    /// No lookups, no I/O.
    pub fn validate(&self) -> Result<(), DeFiError> {
        self.check().map_err(|reason| self.invalid(reason))
    }

    fn check(&self) -> Result<(), String> {
        match self {
            DeFiRequest::Swap(r) => {
                check_token("from_token", &r.from_token)?;
                check_token("to_token", &r.to_token)?;
                if r.from_token.eq_ignore_ascii_case(&r.to_token) {
                    return Err("from_token and to_token are the same".into());
                }
                check_amount("amount", &r.amount)?;
                if let Some(expected) = &r.expected_amount_out {
                    check_amount("expected_amount_out", expected)?;
                }
                check_slippage(r.slippage_bps)
            }
            DeFiRequest::AddLiquidity(r) => {
                check_token("token_a", &r.token_a)?;
                check_token("token_b", &r.token_b)?;
                if r.token_a.eq_ignore_ascii_case(&r.token_b) {
                    return Err("token_a and token_b are the same".into());
                }
                check_amount("amount_a", &r.amount_a)?;
                check_amount("amount_b", &r.amount_b)?;
                check_slippage(r.slippage_bps)
            }
            DeFiRequest::RemoveLiquidity(r) => {
                check_token("token_a", &r.token_a)?;
                check_token("token_b", &r.token_b)?;
                if r.token_a.eq_ignore_ascii_case(&r.token_b) {
                    return Err("token_a and token_b are the same".into());
                }
                check_amount("liquidity", &r.liquidity)
            }
            DeFiRequest::Deposit(r) => {
                check_token("token", &r.token)?;
                check_amount("amount", &r.amount)
            }
            DeFiRequest::Withdraw(r) => {
                check_token("token", &r.token)?;
                if is_max(&r.amount) {
                    return Ok(());
                }
                check_amount("amount", &r.amount)
            }
            DeFiRequest::Stake(r) => {
                check_token("token", &r.token)?;
                check_amount("amount", &r.amount)
            }
            DeFiRequest::Unstake(r) => {
                check_token("token", &r.token)?;
                check_amount("amount", &r.amount)
            }
        }
    }
}

pub(crate) fn is_max(amount: &str) -> bool {
    amount.trim().eq_ignore_ascii_case("max")
}

/// `amount * (10_000 - slippage_bps) / 10_000`, rounded down.
pub fn apply_slippage(amount: U256, slippage_bps: u32) -> U256 {
    let keep = U256::from(MAX_BPS.saturating_sub(slippage_bps));
    amount.saturating_mul(keep) / U256::from(MAX_BPS)
}

macro_rules! into_request {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for DeFiRequest {
            fn from(request: $ty) -> Self {
                DeFiRequest::$variant(request)
            }
        })*
    };
}

into_request! {
    SwapRequest => Swap,
    AddLiquidityRequest => AddLiquidity,
    RemoveLiquidityRequest => RemoveLiquidity,
    DepositRequest => Deposit,
    WithdrawRequest => Withdraw,
    StakeRequest => Stake,
    UnstakeRequest => Unstake,
}
