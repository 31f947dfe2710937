use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chain_evm::address::{checksum_address, pubkey_to_address, validate_address};
use chrono::Utc;
use crypto_utils::ZeroizingBytes;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::auth::HardwareWallet;
use crate::error::WalletError;
use crate::hd_derivation::{derive_secp256k1_key, evm_derivation_path, DerivedKey};
use crate::keystore::{SecureStorage, StoredSecret};
use crate::mnemonic::{generate_mnemonic, mnemonic_to_seed, normalize_phrase, validate_mnemonic, WordCount};
use crate::wallet::{SecurityLevel, Wallet, WalletId, WalletKind, WalletRecord};

/// Owns wallet metadata and mediates every access to wallet secrets.
///
/// Secrets are fetched from the [`SecureStorage`] collaborator per call and
/// wiped before the call returns; nothing is cached.
pub struct KeyManager {
    storage: Arc<dyn SecureStorage>,
    hardware: Option<Arc<dyn HardwareWallet>>,
    wallets: RwLock<BTreeMap<WalletId, Wallet>>,
}

impl KeyManager {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            hardware: None,
            wallets: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_hardware(mut self, hardware: Arc<dyn HardwareWallet>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    pub fn hardware(&self) -> Option<&Arc<dyn HardwareWallet>> {
        self.hardware.as_ref()
    }

    /// Generates a fresh 24-word HD wallet.
    ///
    /// The returned value carries the phrase for one-time backup display; the
    /// stored copy does not.
    pub async fn create_wallet(&self, name: &str) -> Result<Wallet, WalletError> {
        self.create_wallet_with(name, WordCount::default()).await
    }

    pub async fn create_wallet_with(
        &self,
        name: &str,
        words: WordCount,
    ) -> Result<Wallet, WalletError> {
        let phrase = generate_mnemonic(words)?;
        let seed = mnemonic_to_seed(&phrase, "")?;
        let path = evm_derivation_path(0, 0);
        let key = derive_secp256k1_key(&seed, &path)?;

        let wallet = new_wallet(name, &key, WalletKind::Hd);
        let secret = StoredSecret::Mnemonic {
            phrase: phrase.clone(),
            index: 0,
        };
        self.persist(&wallet, secret.encode()).await?;

        info!(wallet_id = %wallet.id, address = %wallet.address, "wallet created");
        Ok(Wallet {
            mnemonic: Some(phrase),
            ..wallet
        })
    }

    /// Imports either a 64-hex-digit private key (optionally `0x`-prefixed) or
    /// a BIP-39 phrase.
    pub async fn import_wallet(&self, secret: &str, name: &str) -> Result<Wallet, WalletError> {
        let trimmed = secret.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if trimmed.split_whitespace().count() > 1 {
            self.import_mnemonic(trimmed, name).await
        } else if hex_part.len() == 64 {
            self.import_private_key(trimmed, name).await
        } else {
            Err(WalletError::InvalidPrivateKey(
                "expected 64 hex characters or a mnemonic phrase".into(),
            ))
        }
    }

    pub async fn import_private_key(
        &self,
        private_key_hex: &str,
        name: &str,
    ) -> Result<Wallet, WalletError> {
        let trimmed = private_key_hex.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex_part.len() != 64 {
            return Err(WalletError::InvalidPrivateKey(format!(
                "expected 64 hex characters, got {}",
                hex_part.len()
            )));
        }

        let mut raw = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(hex_part, &mut raw[..])
            .map_err(|_| WalletError::InvalidPrivateKey("non-hex characters".into()))?;

        let key = DerivedKey::from_private_key(&raw, None)?;
        let wallet = new_wallet(name, &key, WalletKind::Hd);
        let secret = StoredSecret::PrivateKey(ZeroizingBytes::from(&raw[..]));
        self.persist(&wallet, secret.encode()).await?;

        info!(wallet_id = %wallet.id, address = %wallet.address, "wallet imported from private key");
        Ok(wallet)
    }

    pub async fn import_mnemonic(&self, phrase: &str, name: &str) -> Result<Wallet, WalletError> {
        validate_mnemonic(phrase)?;
        let phrase = normalize_phrase(phrase);
        let seed = mnemonic_to_seed(&phrase, "")?;
        let key = derive_secp256k1_key(&seed, &evm_derivation_path(0, 0))?;

        let wallet = new_wallet(name, &key, WalletKind::Hd);
        let secret = StoredSecret::Mnemonic { phrase, index: 0 };
        self.persist(&wallet, secret.encode()).await?;

        info!(wallet_id = %wallet.id, address = %wallet.address, "wallet imported from mnemonic");
        Ok(wallet)
    }

    /// Tracks an address without any key material.
    pub async fn import_watch_only(&self, address: &str, name: &str) -> Result<Wallet, WalletError> {
        validate_address(address)?;
        let wallet = Wallet {
            kind: WalletKind::WatchOnly,
            public_key: String::new(),
            address: checksum_address(address)?,
            ..blank_wallet(name)
        };
        self.wallets
            .write()
            .await
            .insert(wallet.id.clone(), wallet.clone());

        info!(wallet_id = %wallet.id, address = %wallet.address, "watch-only wallet added");
        Ok(wallet)
    }

    /// Registers the account at `path` on the connected hardware device.
    pub async fn register_hardware_wallet(
        &self,
        name: &str,
        path: &str,
    ) -> Result<Wallet, WalletError> {
        let hardware = self.hardware.as_ref().ok_or_else(|| {
            WalletError::HardwareWalletNotConnected("no hardware wallet configured".into())
        })?;
        let public_key = hardware.get_public_key(path).await?;
        let address = pubkey_to_address(&public_key)?;

        let wallet = Wallet {
            kind: WalletKind::Hardware,
            address,
            public_key: hex::encode(&public_key),
            derivation_path: Some(path.to_string()),
            security_level: SecurityLevel::High,
            ..blank_wallet(name)
        };
        self.wallets
            .write()
            .await
            .insert(wallet.id.clone(), wallet.clone());

        info!(wallet_id = %wallet.id, address = %wallet.address, path, "hardware wallet registered");
        Ok(wallet)
    }

    /// Purges the secret, then the metadata. If the purge fails the wallet
    /// stays listed so no secret is orphaned.
    pub async fn delete_wallet(&self, id: &str) -> Result<(), WalletError> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .get(id)
            .ok_or_else(|| WalletError::WalletNotFound(id.to_string()))?;

        if wallet.kind.has_local_secret() {
            if let Err(e) = self.storage.delete(id).await {
                warn!(wallet_id = %id, error = %e, "secret purge failed, wallet kept");
                return Err(e);
            }
        }

        wallets.remove(id);
        info!(wallet_id = %id, "wallet deleted");
        Ok(())
    }

    /// All wallets, oldest first.
    pub async fn list_wallets(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self.wallets.read().await.values().cloned().collect();
        wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        wallets
    }

    pub async fn get(&self, id: &str) -> Option<Wallet> {
        self.wallets.read().await.get(id).cloned()
    }

    pub async fn require(&self, id: &str) -> Result<Wallet, WalletError> {
        self.get(id)
            .await
            .ok_or_else(|| WalletError::WalletNotFound(id.to_string()))
    }

    pub async fn set_active(&self, id: &str, is_active: bool) -> Result<Wallet, WalletError> {
        self.update(id, |w| w.with_active(is_active)).await
    }

    pub async fn set_metadata(&self, id: &str, key: &str, value: &str) -> Result<Wallet, WalletError> {
        self.update(id, |w| w.with_metadata(key, value)).await
    }

    pub async fn set_networks(&self, id: &str, networks: BTreeSet<u64>) -> Result<Wallet, WalletError> {
        self.update(id, |w| w.with_networks(networks)).await
    }

    pub async fn set_security_level(
        &self,
        id: &str,
        level: SecurityLevel,
    ) -> Result<Wallet, WalletError> {
        self.update(id, |w| w.with_security_level(level)).await
    }

    pub async fn mark_used(&self, id: &str) -> Result<Wallet, WalletError> {
        self.update(id, |w| w.touched(Utc::now())).await
    }

    /// Runs `f` with the wallet's private key, then wipes the key.
    ///
    /// The stored secret must still derive the wallet's address; anything
    /// else is reported as storage corruption.
    pub async fn with_signing_key<R>(
        &self,
        id: &str,
        f: impl FnOnce(&[u8; 32]) -> Result<R, WalletError>,
    ) -> Result<R, WalletError> {
        let wallet = self.require(id).await?;
        if !wallet.kind.has_local_secret() {
            return Err(WalletError::SigningUnavailable(format!(
                "{:?} wallet {id} has no local key",
                wallet.kind
            )));
        }

        let encoded = self
            .storage
            .get(id)
            .await?
            .ok_or_else(|| WalletError::StorageError(format!("no secret stored for wallet {id}")))?;
        let key = unlock(StoredSecret::decode(&encoded)?)?;
        drop(encoded);

        if !key.address.eq_ignore_ascii_case(&wallet.address) {
            return Err(WalletError::StorageError(format!(
                "stored secret for wallet {id} does not match its address"
            )));
        }

        debug!(wallet_id = %id, "signing key unlocked");
        f(&key.private_key)
    }

    /// Flat records for every wallet, secrets excluded.
    pub async fn export_records(&self) -> Vec<WalletRecord> {
        self.list_wallets().await.iter().map(Wallet::record).collect()
    }

    pub async fn export_json(&self) -> Result<String, WalletError> {
        serde_json::to_string_pretty(&self.export_records().await)
            .map_err(|e| WalletError::StorageError(e.to_string()))
    }

    /// Loads persisted records, skipping ids already present. Returns how many
    /// were added.
    pub async fn restore_records(&self, records: Vec<WalletRecord>) -> Result<usize, WalletError> {
        let mut restored = Vec::with_capacity(records.len());
        for record in records {
            let wallet = Wallet::from(record);
            if !wallet.is_valid() {
                return Err(WalletError::InvalidAddress(format!(
                    "record {} failed validation",
                    wallet.id
                )));
            }
            if wallet.kind.has_local_secret() && !self.storage.contains(&wallet.id).await? {
                warn!(wallet_id = %wallet.id, "restored wallet has no secret in storage");
            }
            restored.push(wallet);
        }

        let mut wallets = self.wallets.write().await;
        let mut added = 0;
        for wallet in restored {
            if !wallets.contains_key(&wallet.id) {
                wallets.insert(wallet.id.clone(), wallet);
                added += 1;
            }
        }
        info!(count = added, "wallet records restored");
        Ok(added)
    }

    pub async fn restore_json(&self, json: &str) -> Result<usize, WalletError> {
        let records: Vec<WalletRecord> =
            serde_json::from_str(json).map_err(|e| WalletError::StorageError(e.to_string()))?;
        self.restore_records(records).await
    }

    async fn persist(&self, wallet: &Wallet, secret: ZeroizingBytes) -> Result<(), WalletError> {
        self.storage.put(&wallet.id, secret).await?;
        self.wallets
            .write()
            .await
            .insert(wallet.id.clone(), wallet.clone().without_mnemonic());
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        f: impl FnOnce(Wallet) -> Wallet,
    ) -> Result<Wallet, WalletError> {
        let mut wallets = self.wallets.write().await;
        let current = wallets
            .remove(id)
            .ok_or_else(|| WalletError::WalletNotFound(id.to_string()))?;
        let next = f(current);
        wallets.insert(id.to_string(), next.clone());
        Ok(next)
    }
}

fn unlock(secret: StoredSecret) -> Result<DerivedKey, WalletError> {
    let corrupt = |e: WalletError| WalletError::StorageError(format!("stored secret unusable: {e}"));
    match secret {
        StoredSecret::PrivateKey(bytes) => {
            let mut raw = bytes
                .to_array::<32>()
                .ok_or_else(|| WalletError::StorageError("stored key has wrong length".into()))?;
            let key = DerivedKey::from_private_key(&raw, None).map_err(corrupt);
            raw.zeroize();
            key
        }
        StoredSecret::Mnemonic { phrase, index } => {
            let seed = mnemonic_to_seed(&phrase, "").map_err(corrupt)?;
            derive_secp256k1_key(&seed, &evm_derivation_path(0, index)).map_err(corrupt)
        }
    }
}

fn blank_wallet(name: &str) -> Wallet {
    Wallet {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        address: String::new(),
        public_key: String::new(),
        mnemonic: None,
        derivation_path: None,
        created_at: Utc::now(),
        is_active: true,
        networks: BTreeSet::new(),
        kind: WalletKind::Hd,
        security_level: SecurityLevel::default(),
        last_used: None,
        metadata: BTreeMap::new(),
    }
}

fn new_wallet(name: &str, key: &DerivedKey, kind: WalletKind) -> Wallet {
    Wallet {
        address: key.address.clone(),
        public_key: key.public_key_hex(),
        derivation_path: key.derivation_path.clone(),
        kind,
        ..blank_wallet(name)
    }
}
