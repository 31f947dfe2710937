//! TOML engine configuration.
//!
//! Every field has a default, so an empty document is a valid config.
//!
//! ```toml
//! default_chain_id = 1
//!
//! [rpc]
//! timeout_secs = 30
//!
//! [[rpc.overrides]]
//! chain_id = 1
//! url = "https://eth.example.org"
//!
//! [retry]
//! max_attempts = 3
//!
//! [monitor]
//! confirmations = 2
//!
//! [logging]
//! level = "wallet_core=debug"
//! json = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::MonitorOptions;
use crate::network::{validate_url, Network, ETHEREUM};
use crate::registry::NetworkRegistry;
use crate::telemetry::LogSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcOverride {
    pub chain_id: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub timeout_secs: u64,
    pub overrides: Vec<RpcOverride>,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            overrides: Vec::new(),
        }
    }
}

impl RpcSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Backoff for transient RPC failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
    pub confirmations: u64,
    pub timeout_secs: u64,
    pub drop_after_misses: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorOptions::default();
        Self {
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            confirmations: defaults.confirmations,
            timeout_secs: defaults.timeout.as_secs(),
            drop_after_misses: defaults.drop_after_misses,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Network the engine starts on.
    pub default_chain_id: u64,
    pub rpc: RpcSettings,
    pub retry: RetrySettings,
    pub monitor: MonitorSettings,
    pub logging: LogSettings,
    /// Registered after the builtin catalog.
    pub networks: Vec<Network>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_chain_id: ETHEREUM,
            rpc: RpcSettings::default(),
            retry: RetrySettings::default(),
            monitor: MonitorSettings::default(),
            logging: LogSettings::default(),
            networks: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.timeout_secs == 0 {
            return Err(ConfigError::Invalid("rpc.timeout_secs must be positive".into()));
        }
        for o in &self.rpc.overrides {
            validate_url("rpc override", &o.url).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        if self.monitor.confirmations == 0 {
            return Err(ConfigError::Invalid("monitor.confirmations must be at least 1".into()));
        }
        if self.monitor.poll_interval_ms == 0 || self.monitor.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.poll_interval_ms and monitor.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Builtin catalog plus `[[networks]]`. The default chain must resolve.
    pub fn network_registry(&self) -> Result<NetworkRegistry, ConfigError> {
        let registry = NetworkRegistry::with_builtin();
        for network in &self.networks {
            registry
                .register(network.clone())
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if !registry.contains(self.default_chain_id) {
            return Err(ConfigError::Invalid(format!(
                "default_chain_id {} is not a registered network",
                self.default_chain_id
            )));
        }
        Ok(registry)
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            confirmations: self.monitor.confirmations,
            timeout: Duration::from_secs(self.monitor.timeout_secs),
            poll_interval: Duration::from_millis(self.monitor.poll_interval_ms),
            drop_after_misses: self.monitor.drop_after_misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const FULL: &str = r#"
default_chain_id = 31337

[rpc]
timeout_secs = 10

[[rpc.overrides]]
chain_id = 1
url = "https://eth.example.org"

[retry]
max_attempts = 5
base_delay_ms = 100
max_delay_ms = 1000

[monitor]
poll_interval_ms = 500
confirmations = 3
timeout_secs = 60
drop_after_misses = 10

[logging]
level = "debug"
json = true

[[networks]]
id = "anvil"
name = "Local Anvil"
chain_id = 31337
rpc_url = "http://127.0.0.1:8545"
explorer_url = "http://localhost:4000"
block_time_ms = 1000
is_testnet = true
features = ["smart_contracts", "fee_market"]

[networks.native_currency]
name = "Ether"
symbol = "ETH"
decimals = 18
"#;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.monitor_options(), MonitorOptions::default());
        assert_eq!(config.rpc.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn full_document_parses() {
        let config = EngineConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.rpc.overrides[0].chain_id, 1);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.logging.json);

        let options = config.monitor_options();
        assert_eq!(options.confirmations, 3);
        assert_eq!(options.poll_interval, Duration::from_millis(500));

        let registry = config.network_registry().unwrap();
        let anvil = registry.resolve_by_chain_id(31337).unwrap();
        assert!(anvil.supports_fee_market());
        assert_eq!(registry.resolve_by_id("anvil").unwrap().chain_id, 31337);
    }

    #[test]
    fn duplicate_custom_network_rejected() {
        let raw = FULL.replace("chain_id = 31337\nrpc_url", "chain_id = 1\nrpc_url");
        let config = EngineConfig::from_toml_str(&raw).unwrap();
        assert!(matches!(config.network_registry(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_default_chain_rejected() {
        let config = EngineConfig::from_toml_str("default_chain_id = 999").unwrap();
        assert!(matches!(config.network_registry(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_values_rejected() {
        for raw in [
            "[retry]\nmax_attempts = 0",
            "[retry]\nbase_delay_ms = 10\nmax_delay_ms = 1",
            "[monitor]\nconfirmations = 0",
            "[rpc]\ntimeout_secs = 0",
            "[[rpc.overrides]]\nchain_id = 1\nurl = \"ftp://nope\"",
        ] {
            assert!(
                matches!(EngineConfig::from_toml_str(raw), Err(ConfigError::Invalid(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("[rpc\ntimeout_secs = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[monitor]\nconfirmations = 6\n").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.monitor.confirmations, 6);

        assert!(matches!(
            EngineConfig::load("/nonexistent/engine.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
