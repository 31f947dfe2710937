use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chain_evm::address::{pubkey_to_address, validate_address};
use chrono::{DateTime, Utc};
use crypto_utils::ZeroizingString;
use serde::{Deserialize, Serialize};

use crate::mnemonic::validate_mnemonic;

pub type WalletId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Hd,
    Hardware,
    WatchOnly,
    MultiSig,
    SmartContract,
}

impl WalletKind {
    /// Whether the engine keeps a secret for this wallet in secure storage.
    pub fn has_local_secret(&self) -> bool {
        matches!(self, WalletKind::Hd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Basic,
    #[default]
    Standard,
    High,
    Maximum,
}

impl SecurityLevel {
    /// `High` and above need an explicit user confirmation before signing.
    pub fn requires_confirmation(&self) -> bool {
        *self >= SecurityLevel::High
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SecurityLevel::Basic => "basic",
            SecurityLevel::Standard => "standard",
            SecurityLevel::High => "high",
            SecurityLevel::Maximum => "maximum",
        };
        f.write_str(label)
    }
}

/// Public wallet value. Private keys never live here.
///
/// `mnemonic` is populated only on the value returned from wallet creation so
/// the caller can show a backup phrase once; stored copies drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    /// EIP-55 checksummed address.
    pub address: String,
    /// Uncompressed SEC1 public key, hex without prefix. Empty for wallets
    /// tracked by address only.
    pub public_key: String,
    pub mnemonic: Option<ZeroizingString>,
    pub derivation_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub networks: BTreeSet<u64>,
    pub kind: WalletKind,
    pub security_level: SecurityLevel,
    pub last_used: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
}

impl Wallet {
    /// Checks the address checksum, public-key encoding and address binding,
    /// and the mnemonic checksum when one is attached.
    pub fn is_valid(&self) -> bool {
        if validate_address(&self.address).is_err() {
            return false;
        }

        if self.public_key.is_empty() {
            if matches!(self.kind, WalletKind::Hd | WalletKind::Hardware) {
                return false;
            }
        } else {
            let Ok(pubkey) = hex::decode(&self.public_key) else {
                return false;
            };
            if pubkey.len() != 65 && pubkey.len() != 33 {
                return false;
            }
            match pubkey_to_address(&pubkey) {
                Ok(derived) if derived.eq_ignore_ascii_case(&self.address) => {}
                _ => return false,
            }
        }

        match &self.mnemonic {
            Some(phrase) => validate_mnemonic(phrase).is_ok(),
            None => true,
        }
    }

    /// An empty network set means every registered network is allowed.
    pub fn supports_network(&self, chain_id: u64) -> bool {
        self.networks.is_empty() || self.networks.contains(&chain_id)
    }

    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.last_used = Some(at);
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_networks(mut self, networks: BTreeSet<u64>) -> Self {
        self.networks = networks;
        self
    }

    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    pub fn without_mnemonic(mut self) -> Self {
        self.mnemonic = None;
        self
    }

    pub fn record(&self) -> WalletRecord {
        WalletRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            public_key: self.public_key.clone(),
            kind: self.kind,
            security_level: self.security_level,
            networks: self.networks.clone(),
            derivation_path: self.derivation_path.clone(),
            is_active: self.is_active,
            created_at: self.created_at,
            last_used: self.last_used,
            metadata: self.metadata.clone(),
        }
    }
}

/// Flat persisted layout of a wallet. Secrets are never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: WalletId,
    pub name: String,
    pub address: String,
    pub public_key: String,
    pub kind: WalletKind,
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub networks: BTreeSet<u64>,
    #[serde(default)]
    pub derivation_path: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_active() -> bool {
    true
}

impl From<WalletRecord> for Wallet {
    fn from(record: WalletRecord) -> Self {
        Wallet {
            id: record.id,
            name: record.name,
            address: record.address,
            public_key: record.public_key,
            mnemonic: None,
            derivation_path: record.derivation_path,
            created_at: record.created_at,
            is_active: record.is_active,
            networks: record.networks,
            kind: record.kind,
            security_level: record.security_level,
            last_used: record.last_used,
            metadata: record.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Private key 1.
    const PUBKEY_ONE: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";
    const ADDRESS_ONE: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    fn wallet() -> Wallet {
        Wallet {
            id: "w-1".into(),
            name: "Main".into(),
            address: ADDRESS_ONE.into(),
            public_key: PUBKEY_ONE.into(),
            mnemonic: None,
            derivation_path: None,
            created_at: Utc::now(),
            is_active: true,
            networks: BTreeSet::new(),
            kind: WalletKind::Hd,
            security_level: SecurityLevel::Standard,
            last_used: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_wallet() {
        assert!(wallet().is_valid());
    }

    #[test]
    fn address_must_match_public_key() {
        let mut w = wallet();
        w.address = "0x000000000000000000000000000000000000dEaD".into();
        assert!(!w.is_valid());
    }

    #[test]
    fn broken_checksum_is_invalid() {
        let mut w = wallet();
        w.address = "0x7e5F4552091A69125d5DfCb7b8C2659029395Bdf".into();
        assert!(!w.is_valid());
    }

    #[test]
    fn public_key_length_checked() {
        let mut w = wallet();
        w.public_key = "04abcd".into();
        assert!(!w.is_valid());
    }

    #[test]
    fn watch_only_needs_no_public_key() {
        let mut w = wallet();
        w.public_key.clear();
        assert!(!w.is_valid());
        w.kind = WalletKind::WatchOnly;
        assert!(w.is_valid());
    }

    #[test]
    fn invalid_mnemonic_invalidates_wallet() {
        let mut w = wallet();
        w.mnemonic = Some("abandon abandon abandon".into());
        assert!(!w.is_valid());
    }

    #[test]
    fn transitions_return_new_values() {
        let original = wallet();
        let now = Utc::now();
        let updated = original
            .clone()
            .touched(now)
            .with_active(false)
            .with_metadata("label", "cold")
            .with_networks([1u64, 137].into_iter().collect());

        assert_eq!(original.last_used, None);
        assert_eq!(updated.last_used, Some(now));
        assert!(!updated.is_active);
        assert_eq!(updated.metadata.get("label").map(String::as_str), Some("cold"));
        assert!(updated.supports_network(137));
        assert!(!updated.supports_network(10));
        assert!(original.supports_network(10));
    }

    #[test]
    fn record_roundtrip_drops_mnemonic() {
        let mut w = wallet();
        w.mnemonic = Some("secret words".into());
        let json = serde_json::to_string(&w.record()).unwrap();
        assert!(!json.contains("secret"));

        let record: WalletRecord = serde_json::from_str(&json).unwrap();
        let restored = Wallet::from(record);
        assert_eq!(restored, w.without_mnemonic());
    }

    #[test]
    fn security_levels() {
        assert!(!SecurityLevel::Standard.requires_confirmation());
        assert!(SecurityLevel::High.requires_confirmation());
        assert!(SecurityLevel::Maximum.requires_confirmation());
        assert_eq!(SecurityLevel::default(), SecurityLevel::Standard);
    }
}
