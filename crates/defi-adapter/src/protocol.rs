//! Supported protocols and their per-chain contract addresses.

use std::collections::BTreeMap;
use std::fmt;

use chain_evm::address::parse_address;
use serde::{Deserialize, Serialize};
use wallet_core::network::{ETHEREUM, POLYGON};

use crate::error::DeFiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    UniswapV2,
    UniswapV3,
    SushiSwap,
    AaveV3,
    Lido,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::UniswapV2 => "uniswap_v2",
            Protocol::UniswapV3 => "uniswap_v3",
            Protocol::SushiSwap => "sushi_swap",
            Protocol::AaveV3 => "aave_v3",
            Protocol::Lido => "lido",
        }
    }

    /// Uniswap V2 router ABI (`swapExact*`, `addLiquidity*`).
    pub fn is_v2_dex(&self) -> bool {
        matches!(self, Protocol::UniswapV2 | Protocol::SushiSwap)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract addresses for one protocol on one chain. Which fields a request
/// needs depends on the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub protocol: Protocol,
    pub chain_id: u64,
    /// Swap router.
    #[serde(default)]
    pub router: Option<String>,
    #[serde(default)]
    pub factory: Option<String>,
    /// Lending pool.
    #[serde(default)]
    pub pool: Option<String>,
    /// Staking contract, which is also the liquid staking token.
    #[serde(default)]
    pub staking: Option<String>,
    #[serde(default)]
    pub withdrawal_queue: Option<String>,
    /// Wrapped native token used in router paths.
    #[serde(default)]
    pub wrapped_native: Option<String>,
    /// Pool fee in hundredths of a basis point (V3).
    #[serde(default)]
    pub fee_tier: Option<u32>,
}

impl ProtocolConfig {
    fn new(protocol: Protocol, chain_id: u64) -> Self {
        Self {
            protocol,
            chain_id,
            router: None,
            factory: None,
            pool: None,
            staking: None,
            withdrawal_queue: None,
            wrapped_native: None,
            fee_tier: None,
        }
    }

    fn addresses(&self) -> [(&'static str, Option<&String>); 6] {
        [
            ("router", self.router.as_ref()),
            ("factory", self.factory.as_ref()),
            ("pool", self.pool.as_ref()),
            ("staking", self.staking.as_ref()),
            ("withdrawal_queue", self.withdrawal_queue.as_ref()),
            ("wrapped_native", self.wrapped_native.as_ref()),
        ]
    }

    pub fn validate(&self) -> Result<(), DeFiError> {
        for (field, address) in self.addresses() {
            if let Some(address) = address {
                parse_address(address).map_err(|e| {
                    DeFiError::Config(format!("{} {field} on chain {}: {e}", self.protocol, self.chain_id))
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProtocolFile {
    #[serde(default)]
    protocols: Vec<ProtocolConfig>,
}

/// Protocol configs keyed by `(protocol, chain_id)`.
#[derive(Debug, Clone, Default)]
pub struct ProtocolBook {
    entries: BTreeMap<(Protocol, u64), ProtocolConfig>,
}

impl ProtocolBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mainnet deployments on Ethereum and Polygon.
    pub fn builtin() -> Self {
        let mut book = Self::new();
        for config in builtin_configs() {
            book.entries.insert((config.protocol, config.chain_id), config);
        }
        book
    }

    /// Builtin entries overlaid with a `[[protocols]]` document.
    pub fn from_toml_str(raw: &str) -> Result<Self, DeFiError> {
        let file: ProtocolFile = toml::from_str(raw)?;
        let mut book = Self::builtin();
        for config in file.protocols {
            book.insert(config)?;
        }
        Ok(book)
    }

    /// Adds or replaces the entry for the config's protocol and chain.
    pub fn insert(&mut self, config: ProtocolConfig) -> Result<(), DeFiError> {
        config.validate()?;
        self.entries.insert((config.protocol, config.chain_id), config);
        Ok(())
    }

    pub fn get(&self, protocol: Protocol, chain_id: u64) -> Option<&ProtocolConfig> {
        self.entries.get(&(protocol, chain_id))
    }

    pub fn for_chain(&self, chain_id: u64) -> impl Iterator<Item = &ProtocolConfig> {
        self.entries.values().filter(move |c| c.chain_id == chain_id)
    }
}

fn builtin_configs() -> Vec<ProtocolConfig> {
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const WMATIC: &str = "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270";
    let s = |a: &str| Some(a.to_string());

    vec![
        ProtocolConfig {
            router: s("0x7a250d5630b4cf539739df2c5dacb4c659f2488d"),
            factory: s("0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f"),
            wrapped_native: s(WETH),
            ..ProtocolConfig::new(Protocol::UniswapV2, ETHEREUM)
        },
        ProtocolConfig {
            router: s("0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45"),
            factory: s("0x1f98431c8ad98523631ae4a59f8677fb95f67a9b"),
            wrapped_native: s(WETH),
            fee_tier: Some(3_000),
            ..ProtocolConfig::new(Protocol::UniswapV3, ETHEREUM)
        },
        ProtocolConfig {
            router: s("0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45"),
            factory: s("0x1f98431c8ad98523631ae4a59f8677fb95f67a9b"),
            wrapped_native: s(WMATIC),
            fee_tier: Some(500),
            ..ProtocolConfig::new(Protocol::UniswapV3, POLYGON)
        },
        ProtocolConfig {
            router: s("0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f"),
            factory: s("0xc0aee478e3658e2610c5f7a4a2e1777ce9e4f2ac"),
            wrapped_native: s(WETH),
            ..ProtocolConfig::new(Protocol::SushiSwap, ETHEREUM)
        },
        ProtocolConfig {
            router: s("0x1b02da8cb0d097eb8d57a175b88c7d8b47997506"),
            factory: s("0xc35dadb65012ec5796536bd9864ed8773abc74c4"),
            wrapped_native: s(WMATIC),
            ..ProtocolConfig::new(Protocol::SushiSwap, POLYGON)
        },
        ProtocolConfig {
            pool: s("0x87870bca3f3fd6335c3f4ce8392d69350b4fa4e2"),
            ..ProtocolConfig::new(Protocol::AaveV3, ETHEREUM)
        },
        ProtocolConfig {
            pool: s("0x794a61358d6845594f94dc1db02a252b5b4814ad"),
            ..ProtocolConfig::new(Protocol::AaveV3, POLYGON)
        },
        ProtocolConfig {
            staking: s("0xae7ab96520de3a18e5e111b5eaab095312d7fe84"),
            withdrawal_queue: s("0x889edc2edab5f40e902b864ad4d7ade8e412f9b1"),
            ..ProtocolConfig::new(Protocol::Lido, ETHEREUM)
        },
    ]
}
