//! Token descriptors, the per-chain token registry and unit conversion.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use chain_evm::address::{parse_address, ZERO_ADDRESS};
use chain_evm::erc20;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::network::{Network, ETHEREUM, POLYGON};

/// Largest decimals value a token may declare.
pub const MAX_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Fungible,
    NonFungible,
    SemiFungible,
    Wrapped,
    Governance,
    Staking,
    Reward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStandard {
    Erc20,
    Erc721,
    Erc1155,
    Erc777,
    Bep20,
    Native,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Contract address; empty for the chain's native asset.
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Total supply in base units, as a decimal string.
    #[serde(default)]
    pub total_supply: Option<String>,
    pub chain_id: u64,
    pub kind: TokenKind,
    pub standard: TokenStandard,
    #[serde(default)]
    pub verified: bool,
}

impl Token {
    /// Descriptor for a network's native currency.
    pub fn native(network: &Network) -> Self {
        Self {
            address: String::new(),
            name: network.native_currency.name.clone(),
            symbol: network.native_currency.symbol.clone(),
            decimals: network.native_currency.decimals,
            total_supply: None,
            chain_id: network.chain_id,
            kind: TokenKind::Fungible,
            standard: TokenStandard::Native,
            verified: true,
        }
    }

    /// A validated ERC-20 descriptor. The address is stored lowercase.
    pub fn erc20(
        chain_id: u64,
        address: &str,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<Self, TokenError> {
        let token = Self {
            address: address.to_ascii_lowercase(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            total_supply: None,
            chain_id,
            kind: TokenKind::Fungible,
            standard: TokenStandard::Erc20,
            verified: false,
        };
        token.validate()?;
        Ok(token)
    }

    pub fn with_kind(mut self, kind: TokenKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }

    /// Native when the address is empty or the zero sentinel.
    pub fn is_native(&self) -> bool {
        self.address.is_empty()
            || parse_address(&self.address).map_or(false, |a| a == ZERO_ADDRESS)
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if self.decimals > MAX_DECIMALS {
            return Err(TokenError::InvalidDecimals(self.decimals));
        }
        if self.symbol.trim().is_empty() {
            return Err(TokenError::MissingSymbol);
        }
        if self.standard == TokenStandard::Native {
            if !self.is_native() {
                return Err(TokenError::NativeWithAddress);
            }
            return Ok(());
        }
        if self.is_native() {
            return Err(TokenError::InvalidAddress(
                "non-native token needs a contract address".into(),
            ));
        }
        parse_address(&self.address).map_err(|e| TokenError::InvalidAddress(e.to_string()))?;
        Ok(())
    }

    pub fn format_amount(&self, amount: U256) -> String {
        format_units(amount, self.decimals)
    }

    pub fn parse_amount(&self, amount: &str) -> Result<U256, TokenError> {
        parse_units(amount, self.decimals)
    }

    /// `transfer(to, amount)` calldata for this token's contract.
    pub fn transfer_data(&self, to: &str, amount: U256) -> Result<Vec<u8>, TokenError> {
        self.require_contract()?;
        erc20::encode_transfer(to, amount).map_err(|e| TokenError::InvalidAddress(e.to_string()))
    }

    /// `approve(spender, amount)` calldata for this token's contract.
    pub fn approve_data(&self, spender: &str, amount: U256) -> Result<Vec<u8>, TokenError> {
        self.require_contract()?;
        erc20::encode_approve(spender, amount)
            .map_err(|e| TokenError::InvalidAddress(e.to_string()))
    }

    /// `balanceOf(owner)` calldata for this token's contract.
    pub fn balance_of_data(&self, owner: &str) -> Result<Vec<u8>, TokenError> {
        self.require_contract()?;
        erc20::encode_balance_of(owner).map_err(|e| TokenError::InvalidAddress(e.to_string()))
    }

    fn require_contract(&self) -> Result<(), TokenError> {
        if self.is_native() {
            return Err(TokenError::NativeWithAddress);
        }
        Ok(())
    }
}

fn ten_pow(decimals: u8) -> U256 {
    let ten = U256::from(10u64);
    let mut value = U256::from(1u64);
    for _ in 0..decimals {
        value *= ten;
    }
    value
}

/// Formats base units as a decimal string, trimming trailing fractional zeros.
///
/// `format_units(1_500_000, 6) == "1.5"`
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = ten_pow(decimals);
    let whole = amount / scale;
    let fraction = amount % scale;
    if fraction.is_zero() {
        return whole.to_string();
    }

    let digits = fraction.to_string();
    let padded = format!("{}{}", "0".repeat(decimals as usize - digits.len()), digits);
    format!("{}.{}", whole, padded.trim_end_matches('0'))
}

/// Parses a human decimal amount into base units.
///
/// Rejects signs, exponents, empty input and more fractional digits than
/// `decimals` allows.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, TokenError> {
    let trimmed = amount.trim();
    let invalid = || TokenError::InvalidAmount(amount.to_string());

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(TokenError::PrecisionExceeded(decimals));
    }

    let padded = format!(
        "{}{}{}",
        whole,
        fraction,
        "0".repeat(decimals as usize - fraction.len())
    );
    let digits = padded.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid())
}

/// Tokens indexed per chain by lowercase address.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: BTreeMap<(u64, String), Token>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Natives for every given network plus well-known ERC-20s on Ethereum and
    /// Polygon.
    pub fn with_builtin(networks: &[Network]) -> Self {
        let mut registry = Self::new();
        for network in networks {
            registry.insert(Token::native(network));
        }
        for token in builtin_erc20s() {
            registry.insert(token);
        }
        registry
    }

    pub fn register(&mut self, token: Token) -> Result<(), TokenError> {
        token.validate()?;
        let key = Self::key(&token);
        let symbol_taken = self.by_symbol(token.chain_id, &token.symbol).is_some();
        if self.tokens.contains_key(&key) || symbol_taken {
            return Err(TokenError::Duplicate {
                chain_id: token.chain_id,
                symbol: token.symbol,
            });
        }
        self.tokens.insert(key, token);
        Ok(())
    }

    pub fn by_address(&self, chain_id: u64, address: &str) -> Option<&Token> {
        let address = address.to_ascii_lowercase();
        if address.is_empty() || parse_address(&address).map_or(false, |a| a == ZERO_ADDRESS) {
            return self.native(chain_id);
        }
        self.tokens.get(&(chain_id, address))
    }

    /// Case-insensitive symbol lookup.
    pub fn by_symbol(&self, chain_id: u64, symbol: &str) -> Option<&Token> {
        self.for_chain(chain_id)
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Resolves an identifier that may be either an address or a symbol.
    pub fn resolve(&self, chain_id: u64, identifier: &str) -> Option<&Token> {
        if identifier.starts_with("0x") || identifier.starts_with("0X") {
            self.by_address(chain_id, identifier)
        } else {
            self.by_symbol(chain_id, identifier)
        }
    }

    pub fn native(&self, chain_id: u64) -> Option<&Token> {
        self.tokens.get(&(chain_id, String::new()))
    }

    pub fn for_chain(&self, chain_id: u64) -> impl Iterator<Item = &Token> {
        self.tokens
            .range((chain_id, String::new())..)
            .take_while(move |((c, _), _)| *c == chain_id)
            .map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn insert(&mut self, token: Token) {
        self.tokens.insert(Self::key(&token), token);
    }

    fn key(token: &Token) -> (u64, String) {
        let address = if token.is_native() {
            String::new()
        } else {
            token.address.to_ascii_lowercase()
        };
        (token.chain_id, address)
    }
}

fn builtin_erc20s() -> Vec<Token> {
    let entries: [(u64, &str, &str, &str, u8, TokenKind); 6] = [
        (ETHEREUM, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USD Coin", "USDC", 6, TokenKind::Fungible),
        (ETHEREUM, "0xdac17f958d2ee523a2206206994597c13d831ec7", "Tether USD", "USDT", 6, TokenKind::Fungible),
        (ETHEREUM, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "Wrapped Ether", "WETH", 18, TokenKind::Wrapped),
        (ETHEREUM, "0x6b175474e89094c44da98b954eedeac495271d0f", "Dai Stablecoin", "DAI", 18, TokenKind::Fungible),
        (POLYGON, "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359", "USD Coin", "USDC", 6, TokenKind::Fungible),
        (POLYGON, "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270", "Wrapped Matic", "WMATIC", 18, TokenKind::Wrapped),
    ];

    entries
        .into_iter()
        .map(|(chain_id, address, name, symbol, decimals, kind)| Token {
            address: address.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            total_supply: None,
            chain_id,
            kind,
            standard: TokenStandard::Erc20,
            verified: true,
        })
        .collect()
}
