//! Turns DeFi requests into builder input.

use std::sync::Arc;

use alloy_primitives::U256;
use chain_evm::address::parse_address;
use chain_evm::erc20;
use chrono::Utc;
use tracing::{debug, info};
use wallet_core::token::{parse_units, Token};
use wallet_core::{Network, Transaction, TxRequest, Wallet, WalletEngine};

use crate::calldata;
use crate::error::DeFiError;
use crate::protocol::{Protocol, ProtocolBook, ProtocolConfig};
use crate::request::{apply_slippage, is_max, DeFiRequest, DEFAULT_DEADLINE_SECS};

/// Decimals of pool shares and staking receipts.
const SHARE_DECIMALS: u8 = 18;

/// A contract call ready for the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolCall {
    pub target: String,
    /// Native amount attached, in wei.
    pub value: U256,
    pub data: Vec<u8>,
}

/// An ERC-20 allowance the call spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowance {
    pub token: String,
    pub spender: String,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub call: ProtocolCall,
    pub allowances: Vec<Allowance>,
}

/// Resolves requests against the token registry and the protocol book, then
/// hands them to the engine's transaction builder.
pub struct DeFiAdapter {
    engine: Arc<WalletEngine>,
    protocols: ProtocolBook,
}

impl DeFiAdapter {
    pub fn new(engine: Arc<WalletEngine>) -> Self {
        Self {
            engine,
            protocols: ProtocolBook::builtin(),
        }
    }

    pub fn with_protocols(mut self, protocols: ProtocolBook) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn protocols(&self) -> &ProtocolBook {
        &self.protocols
    }

    pub fn validate(&self, request: &DeFiRequest) -> Result<(), DeFiError> {
        request.validate()
    }

    /// Validates, resolves tokens and encodes the call. No RPC.
    pub async fn plan(
        &self,
        request: &DeFiRequest,
        wallet: &Wallet,
        network: &Network,
    ) -> Result<Plan, DeFiError> {
        request.validate()?;
        let config = self
            .protocols
            .get(request.protocol(), network.chain_id)
            .ok_or_else(|| unsupported(request, network.chain_id))?;
        let owner = parse_address(&wallet.address).map_err(|e| request.invalid(e.to_string()))?;

        let planner = Planner {
            adapter: self,
            request,
            config,
            chain_id: network.chain_id,
            owner,
        };
        let plan = planner.plan().await?;
        debug!(
            protocol = %request.protocol(),
            action = request.action(),
            chain_id = network.chain_id,
            target = %plan.call.target,
            allowances = plan.allowances.len(),
            "defi request planned"
        );
        Ok(plan)
    }

    /// Builder input for `request`, tagged with protocol and action metadata.
    pub async fn prepare(
        &self,
        request: &DeFiRequest,
        wallet: &Wallet,
        network: &Network,
    ) -> Result<TxRequest, DeFiError> {
        let plan = self.plan(request, wallet, network).await?;
        Ok(TxRequest::new(&wallet.address, plan.call.target, plan.call.value.to_string())
            .with_data(plan.call.data)
            .with_metadata("defi_protocol", request.protocol().as_str())
            .with_metadata("defi_action", request.action()))
    }

    /// Unsigned transaction for `request` on `network`.
    pub async fn build(
        &self,
        request: &DeFiRequest,
        wallet: &Wallet,
        network: &Network,
    ) -> Result<Transaction, DeFiError> {
        let tx_request = self.prepare(request, wallet, network).await?;
        Ok(self
            .engine
            .transaction_builder()
            .build(tx_request, network)
            .await?)
    }

    /// Builds, signs and broadcasts `request` on `network`.
    ///
    /// Allowances are not granted here; send [`Self::approvals_for`] first
    /// and wait for them to confirm.
    pub async fn execute(
        &self,
        request: &DeFiRequest,
        wallet: &Wallet,
        network: &Network,
    ) -> Result<Transaction, DeFiError> {
        let tx_request = self.prepare(request, wallet, network).await?;
        let sent = self.engine.send_on(network, &wallet.id, tx_request).await?;
        info!(
            protocol = %request.protocol(),
            action = request.action(),
            tx_hash = sent.hash.as_deref().unwrap_or_default(),
            "defi transaction sent"
        );
        Ok(sent)
    }

    /// ERC-20 `approve` requests the call needs, one per spent token.
    pub async fn approvals_for(
        &self,
        request: &DeFiRequest,
        wallet: &Wallet,
        network: &Network,
    ) -> Result<Vec<TxRequest>, DeFiError> {
        let plan = self.plan(request, wallet, network).await?;
        plan.allowances
            .into_iter()
            .map(|allowance| {
                let data = erc20::encode_approve(&allowance.spender, allowance.amount)
                    .map_err(|e| request.invalid(e.to_string()))?;
                Ok(TxRequest::new(&wallet.address, allowance.token, "0")
                    .with_data(data)
                    .with_metadata("defi_protocol", request.protocol().as_str())
                    .with_metadata("defi_action", "approve"))
            })
            .collect()
    }

    async fn token(&self, chain_id: u64, identifier: &str) -> Result<Token, DeFiError> {
        self.engine
            .resolve_token(chain_id, identifier.trim())
            .await
            .ok_or_else(|| DeFiError::UnknownToken {
                chain_id,
                identifier: identifier.to_string(),
            })
    }
}

fn unsupported(request: &DeFiRequest, chain_id: u64) -> DeFiError {
    DeFiError::UnsupportedProtocol {
        protocol: request.protocol(),
        action: request.action(),
        chain_id,
    }
}

fn default_deadline() -> u64 {
    let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
    now + DEFAULT_DEADLINE_SECS
}

struct Planner<'a> {
    adapter: &'a DeFiAdapter,
    request: &'a DeFiRequest,
    config: &'a ProtocolConfig,
    chain_id: u64,
    owner: [u8; 20],
}

impl Planner<'_> {
    async fn plan(&self) -> Result<Plan, DeFiError> {
        match self.request {
            DeFiRequest::Swap(r) => {
                let from = self.token(&r.from_token).await?;
                let to = self.token(&r.to_token).await?;
                if from.is_native() && to.is_native() {
                    return Err(self.invalid("cannot swap the native asset for itself"));
                }
                let amount_in = self.amount(&from, &r.amount)?;
                let min_out = match &r.expected_amount_out {
                    Some(expected) => apply_slippage(self.amount(&to, expected)?, r.slippage_bps),
                    None => U256::ZERO,
                };
                let deadline = r.deadline.unwrap_or_else(default_deadline);
                self.swap(&from, &to, amount_in, min_out, deadline)
            }
            DeFiRequest::AddLiquidity(r) => {
                if !self.config.protocol.is_v2_dex() {
                    return Err(self.unsupported());
                }
                let a = self.token(&r.token_a).await?;
                let b = self.token(&r.token_b).await?;
                let amount_a = self.amount(&a, &r.amount_a)?;
                let amount_b = self.amount(&b, &r.amount_b)?;
                let deadline = r.deadline.unwrap_or_else(default_deadline);
                let router = self.required(self.config.router.as_ref())?;
                let to = self.owner;

                let (call, allowances) = match (a.is_native(), b.is_native()) {
                    (true, true) => return Err(self.invalid("both tokens are the native asset")),
                    (false, false) => (
                        ProtocolCall {
                            target: router.clone(),
                            value: U256::ZERO,
                            data: calldata::add_liquidity(
                                self.address(&a.address)?,
                                self.address(&b.address)?,
                                amount_a,
                                amount_b,
                                apply_slippage(amount_a, r.slippage_bps),
                                apply_slippage(amount_b, r.slippage_bps),
                                to,
                                deadline,
                            ),
                        },
                        vec![
                            allowance(&a, router, amount_a),
                            allowance(&b, router, amount_b),
                        ],
                    ),
                    (native_a, _) => {
                        let (token, amount_token, amount_native) = if native_a {
                            (&b, amount_b, amount_a)
                        } else {
                            (&a, amount_a, amount_b)
                        };
                        (
                            ProtocolCall {
                                target: router.clone(),
                                value: amount_native,
                                data: calldata::add_liquidity_eth(
                                    self.address(&token.address)?,
                                    amount_token,
                                    apply_slippage(amount_token, r.slippage_bps),
                                    apply_slippage(amount_native, r.slippage_bps),
                                    to,
                                    deadline,
                                ),
                            },
                            vec![allowance(token, router, amount_token)],
                        )
                    }
                };
                Ok(Plan { call, allowances })
            }
            DeFiRequest::RemoveLiquidity(r) => {
                if !self.config.protocol.is_v2_dex() {
                    return Err(self.unsupported());
                }
                let a = self.token(&r.token_a).await?;
                let b = self.token(&r.token_b).await?;
                let liquidity = parse_units(&r.liquidity, SHARE_DECIMALS)
                    .map_err(|e| self.invalid(e.to_string()))?;
                let router = self.required(self.config.router.as_ref())?;
                let deadline = r.deadline.unwrap_or_else(default_deadline);
                Ok(Plan {
                    call: ProtocolCall {
                        target: router.clone(),
                        value: U256::ZERO,
                        data: calldata::remove_liquidity(
                            self.pool_side(&a)?,
                            self.pool_side(&b)?,
                            liquidity,
                            self.owner,
                            deadline,
                        ),
                    },
                    // The pair token's address is not known without a factory lookup.
                    allowances: Vec::new(),
                })
            }
            DeFiRequest::Deposit(r) => {
                if self.config.protocol != Protocol::AaveV3 {
                    return Err(self.unsupported());
                }
                let asset = self.token(&r.token).await?;
                if asset.is_native() {
                    return Err(self.invalid("wrap the native asset before supplying it"));
                }
                let amount = self.amount(&asset, &r.amount)?;
                let pool = self.required(self.config.pool.as_ref())?;
                Ok(Plan {
                    call: ProtocolCall {
                        target: pool.clone(),
                        value: U256::ZERO,
                        data: calldata::aave_supply(self.address(&asset.address)?, amount, self.owner),
                    },
                    allowances: vec![allowance(&asset, pool, amount)],
                })
            }
            DeFiRequest::Withdraw(r) => {
                if self.config.protocol != Protocol::AaveV3 {
                    return Err(self.unsupported());
                }
                let asset = self.token(&r.token).await?;
                if asset.is_native() {
                    return Err(self.invalid("the pool holds the wrapped native asset"));
                }
                let amount = if is_max(&r.amount) {
                    U256::MAX
                } else {
                    self.amount(&asset, &r.amount)?
                };
                let pool = self.required(self.config.pool.as_ref())?;
                Ok(Plan {
                    call: ProtocolCall {
                        target: pool.clone(),
                        value: U256::ZERO,
                        data: calldata::aave_withdraw(self.address(&asset.address)?, amount, self.owner),
                    },
                    allowances: Vec::new(),
                })
            }
            DeFiRequest::Stake(r) => {
                if self.config.protocol != Protocol::Lido {
                    return Err(self.unsupported());
                }
                let token = self.token(&r.token).await?;
                if !token.is_native() {
                    return Err(self.invalid(format!("{} stakes the native asset only", self.config.protocol)));
                }
                let amount = self.amount(&token, &r.amount)?;
                let staking = self.required(self.config.staking.as_ref())?;
                Ok(Plan {
                    call: ProtocolCall {
                        target: staking.clone(),
                        value: amount,
                        data: calldata::lido_submit(),
                    },
                    allowances: Vec::new(),
                })
            }
            DeFiRequest::Unstake(r) => {
                if self.config.protocol != Protocol::Lido {
                    return Err(self.unsupported());
                }
                let staking = self.required(self.config.staking.as_ref())?;
                let identifier = r.token.trim();
                if !identifier.eq_ignore_ascii_case("stETH") && !identifier.eq_ignore_ascii_case(staking) {
                    return Err(self.invalid(format!("{identifier} is not the staking token")));
                }
                let amount = parse_units(&r.amount, SHARE_DECIMALS).map_err(|e| self.invalid(e.to_string()))?;
                let queue = self.required(self.config.withdrawal_queue.as_ref())?;
                Ok(Plan {
                    call: ProtocolCall {
                        target: queue.clone(),
                        value: U256::ZERO,
                        data: calldata::lido_request_withdrawals(vec![amount], self.owner),
                    },
                    allowances: vec![Allowance {
                        token: staking.clone(),
                        spender: queue.clone(),
                        amount,
                    }],
                })
            }
        }
    }

    fn swap(
        &self,
        from: &Token,
        to: &Token,
        amount_in: U256,
        min_out: U256,
        deadline: u64,
    ) -> Result<Plan, DeFiError> {
        let router = self.required(self.config.router.as_ref())?;
        let recipient = self.owner;
        if self.pool_side(from)? == self.pool_side(to)? {
            return Err(self.invalid(format!("{} and {} trade as the same pool token", from.symbol, to.symbol)));
        }
        let allowances = if from.is_native() {
            Vec::new()
        } else {
            vec![allowance(from, router, amount_in)]
        };
        let value = if from.is_native() { amount_in } else { U256::ZERO };

        let data = match self.config.protocol {
            Protocol::UniswapV2 | Protocol::SushiSwap => {
                let path = vec![self.pool_side(from)?, self.pool_side(to)?];
                if from.is_native() {
                    calldata::swap_exact_eth_for_tokens(min_out, path, recipient, deadline)
                } else if to.is_native() {
                    calldata::swap_exact_tokens_for_eth(amount_in, min_out, path, recipient, deadline)
                } else {
                    calldata::swap_exact_tokens_for_tokens(amount_in, min_out, path, recipient, deadline)
                }
            }
            Protocol::UniswapV3 => {
                if to.is_native() {
                    return Err(self.invalid("uniswap_v3 output to the native asset needs an unwrap step"));
                }
                calldata::exact_input_single(
                    self.pool_side(from)?,
                    self.pool_side(to)?,
                    self.config.fee_tier.unwrap_or(3_000),
                    recipient,
                    amount_in,
                    min_out,
                )
            }
            Protocol::AaveV3 | Protocol::Lido => return Err(self.unsupported()),
        };

        Ok(Plan {
            call: ProtocolCall {
                target: router.clone(),
                value,
                data,
            },
            allowances,
        })
    }

    async fn token(&self, identifier: &str) -> Result<Token, DeFiError> {
        self.adapter.token(self.chain_id, identifier).await
    }

    fn amount(&self, token: &Token, amount: &str) -> Result<U256, DeFiError> {
        let value = token
            .parse_amount(amount)
            .map_err(|e| self.invalid(format!("{} amount: {e}", token.symbol)))?;
        if value.is_zero() {
            return Err(self.invalid(format!("{} amount rounds to zero", token.symbol)));
        }
        Ok(value)
    }

    /// Pools hold the wrapped native token in place of the native asset.
    fn pool_side(&self, token: &Token) -> Result<[u8; 20], DeFiError> {
        if token.is_native() {
            let wrapped = self.required(self.config.wrapped_native.as_ref())?;
            return self.address(wrapped);
        }
        self.address(&token.address)
    }

    fn required<'c>(&self, field: Option<&'c String>) -> Result<&'c String, DeFiError> {
        field.ok_or_else(|| self.unsupported())
    }

    fn address(&self, address: &str) -> Result<[u8; 20], DeFiError> {
        parse_address(address).map_err(|e| DeFiError::Config(e.to_string()))
    }

    fn invalid(&self, reason: impl Into<String>) -> DeFiError {
        self.request.invalid(reason)
    }

    fn unsupported(&self) -> DeFiError {
        unsupported(self.request, self.chain_id)
    }
}

fn allowance(token: &Token, spender: &str, amount: U256) -> Allowance {
    Allowance {
        token: token.address.clone(),
        spender: spender.to_string(),
        amount,
    }
}
