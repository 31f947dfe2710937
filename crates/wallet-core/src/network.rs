//! Network model and the builtin EVM catalog.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RegistryError;

pub const ETHEREUM: u64 = 1;
pub const OPTIMISM: u64 = 10;
pub const BSC: u64 = 56;
pub const POLYGON: u64 = 137;
pub const BASE: u64 = 8453;
pub const ARBITRUM: u64 = 42161;
pub const AVALANCHE: u64 = 43114;
pub const POLYGON_AMOY: u64 = 80002;
pub const SEPOLIA: u64 = 11155111;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFeature {
    SmartContracts,
    DeFi,
    Staking,
    Nfts,
    /// EIP-1559 base fee + priority fee.
    FeeMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
    Deprecated,
}

impl NetworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Active => "active",
            NetworkStatus::Inactive => "inactive",
            NetworkStatus::Maintenance => "maintenance",
            NetworkStatus::Deprecated => "deprecated",
        }
    }
}

/// A registry entry describing one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Stable slug, e.g. `"ethereum"`.
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_url: String,
    pub native_currency: NativeCurrency,
    /// Nominal block time in milliseconds.
    pub block_time_ms: u64,
    #[serde(default)]
    pub is_testnet: bool,
    #[serde(default)]
    pub features: BTreeSet<NetworkFeature>,
    #[serde(default)]
    pub status: NetworkStatus,
}

impl Network {
    pub fn supports(&self, feature: NetworkFeature) -> bool {
        self.features.contains(&feature)
    }

    pub fn supports_fee_market(&self) -> bool {
        self.supports(NetworkFeature::FeeMarket)
    }

    /// Checks that both URLs parse as http(s) URLs with a host.
    pub fn validate(&self) -> Result<(), RegistryError> {
        validate_url("rpc", &self.rpc_url)?;
        validate_url("explorer", &self.explorer_url)?;
        Ok(())
    }

    /// Block-explorer link for a transaction hash.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }

    pub fn with_status(mut self, status: NetworkStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}

pub(crate) fn validate_url(field: &'static str, raw: &str) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidUrl {
        field,
        url: raw.to_string(),
        reason,
    };

    let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn evm(
    id: &str,
    name: &str,
    chain_id: u64,
    rpc_url: &str,
    explorer_url: &str,
    currency: (&str, &str),
    block_time_ms: u64,
    is_testnet: bool,
    extra: &[NetworkFeature],
) -> Network {
    let mut features: BTreeSet<NetworkFeature> =
        [NetworkFeature::SmartContracts, NetworkFeature::DeFi]
            .into_iter()
            .collect();
    features.extend(extra.iter().copied());

    Network {
        id: id.to_string(),
        name: name.to_string(),
        chain_id,
        rpc_url: rpc_url.to_string(),
        explorer_url: explorer_url.to_string(),
        native_currency: NativeCurrency {
            name: currency.0.to_string(),
            symbol: currency.1.to_string(),
            decimals: 18,
        },
        block_time_ms,
        is_testnet,
        features,
        status: NetworkStatus::Active,
    }
}

/// The builtin catalog registered at startup.
pub fn builtin_networks() -> Vec<Network> {
    use NetworkFeature::{FeeMarket, Nfts, Staking};

    vec![
        evm(
            "ethereum",
            "Ethereum",
            ETHEREUM,
            "https://eth.llamarpc.com",
            "https://etherscan.io",
            ("Ether", "ETH"),
            12_000,
            false,
            &[Staking, Nfts, FeeMarket],
        ),
        evm(
            "optimism",
            "Optimism",
            OPTIMISM,
            "https://mainnet.optimism.io",
            "https://optimistic.etherscan.io",
            ("Ether", "ETH"),
            2_000,
            false,
            &[Nfts, FeeMarket],
        ),
        // BSC accepts type-2 envelopes but prices on gasPrice; keep it legacy.
        evm(
            "bsc",
            "BNB Smart Chain",
            BSC,
            "https://bsc-dataseed.binance.org",
            "https://bscscan.com",
            ("BNB", "BNB"),
            3_000,
            false,
            &[Staking, Nfts],
        ),
        evm(
            "polygon",
            "Polygon",
            POLYGON,
            "https://polygon-rpc.com",
            "https://polygonscan.com",
            ("POL", "MATIC"),
            2_000,
            false,
            &[Staking, Nfts, FeeMarket],
        ),
        evm(
            "base",
            "Base",
            BASE,
            "https://mainnet.base.org",
            "https://basescan.org",
            ("Ether", "ETH"),
            2_000,
            false,
            &[Nfts, FeeMarket],
        ),
        evm(
            "arbitrum",
            "Arbitrum One",
            ARBITRUM,
            "https://arb1.arbitrum.io/rpc",
            "https://arbiscan.io",
            ("Ether", "ETH"),
            250,
            false,
            &[Nfts, FeeMarket],
        ),
        evm(
            "avalanche",
            "Avalanche C-Chain",
            AVALANCHE,
            "https://api.avax.network/ext/bc/C/rpc",
            "https://snowtrace.io",
            ("Avalanche", "AVAX"),
            2_000,
            false,
            &[Staking, Nfts, FeeMarket],
        ),
        evm(
            "polygon-amoy",
            "Polygon Amoy Testnet",
            POLYGON_AMOY,
            "https://rpc-amoy.polygon.technology",
            "https://amoy.polygonscan.com",
            ("POL", "MATIC"),
            2_000,
            true,
            &[FeeMarket],
        ),
        evm(
            "sepolia",
            "Sepolia Testnet",
            SEPOLIA,
            "https://rpc.sepolia.org",
            "https://sepolia.etherscan.io",
            ("Sepolia Ether", "ETH"),
            12_000,
            true,
            &[FeeMarket],
        ),
    ]
}
