//! Transaction and message signing.

use std::sync::Arc;

use chain_evm::transaction::{
    encode_signed, personal_message_hash, recover_address, sign_hash, signing_hash,
    RecoverableSignature,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::error::WalletError;
use crate::key_manager::KeyManager;
use crate::transaction::{SignedTransaction, Transaction, TxStatus};
use crate::validation::validate;
use crate::wallet::{Wallet, WalletKind};

/// Signs on behalf of wallets held by a [`KeyManager`].
///
/// Local keys are borrowed for a single digest and wiped before `sign`
/// returns. Hardware wallets sign on the device.
pub struct Signer {
    keys: Arc<KeyManager>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl Signer {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self {
            keys,
            authenticator: None,
        }
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub async fn sign(&self, tx: &Transaction, wallet_id: &str) -> Result<SignedTransaction, WalletError> {
        validate(tx)?;
        if tx.status != TxStatus::Pending {
            return Err(WalletError::InvalidTransition {
                from: tx.status.as_str(),
                to: "signed",
            });
        }
        if tx.is_broadcast() {
            return Err(WalletError::InvalidTransition {
                from: "broadcast",
                to: "signed",
            });
        }
        let evm = tx.to_evm()?;

        let wallet = self.keys.require(wallet_id).await?;
        if !wallet.address.eq_ignore_ascii_case(&tx.from) {
            return Err(WalletError::SigningFailed(format!(
                "transaction sender {} is not wallet {}",
                tx.from, wallet.address
            )));
        }
        self.authorize(&wallet, "Approve transaction").await?;

        let digest = signing_hash(&evm);
        let signature = self.sign_digest(&wallet, digest).await?;
        check_signer(&wallet, &digest, &signature)?;

        let raw = encode_signed(&evm, &signature);
        self.keys.mark_used(wallet_id).await?;

        let signed = SignedTransaction {
            transaction: tx.clone(),
            signature,
            raw,
            signer: wallet.address.clone(),
            signed_at: Utc::now(),
        };
        info!(
            wallet_id = %wallet_id,
            chain_id = tx.chain_id,
            nonce = tx.nonce,
            tx_hash = %signed.hash(),
            "transaction signed"
        );
        Ok(signed)
    }

    /// EIP-191 `personal_sign`, returned as 65-byte `r || s || v`.
    pub async fn sign_message(&self, message: &[u8], wallet_id: &str) -> Result<[u8; 65], WalletError> {
        let wallet = self.keys.require(wallet_id).await?;
        self.authorize(&wallet, "Sign message").await?;

        let digest = personal_message_hash(message);
        let signature = self.sign_digest(&wallet, digest).await?;
        check_signer(&wallet, &digest, &signature)?;
        self.keys.mark_used(wallet_id).await?;
        Ok(signature.to_rsv_bytes())
    }

    async fn sign_digest(
        &self,
        wallet: &Wallet,
        digest: [u8; 32],
    ) -> Result<RecoverableSignature, WalletError> {
        match wallet.kind {
            WalletKind::Hd => {
                self.keys
                    .with_signing_key(&wallet.id, |key| Ok(sign_hash(&digest, key)?))
                    .await
            }
            WalletKind::Hardware => {
                let device = self.keys.hardware().ok_or_else(|| {
                    WalletError::HardwareWalletNotConnected("no hardware wallet configured".into())
                })?;
                let path = wallet.derivation_path.as_deref().ok_or_else(|| {
                    WalletError::DerivationFailed("hardware wallet has no derivation path".into())
                })?;
                Ok(device.sign_digest(digest, path).await?.normalized()?)
            }
            kind => Err(WalletError::SigningUnavailable(format!(
                "{kind:?} wallet {} has no signing key",
                wallet.id
            ))),
        }
    }

    /// Confirmation gate for `High` and `Maximum` wallets. A hardware
    /// device's on-screen approval counts as the confirmation.
    async fn authorize(&self, wallet: &Wallet, reason: &str) -> Result<(), WalletError> {
        if !wallet.security_level.requires_confirmation() || wallet.kind == WalletKind::Hardware {
            return Ok(());
        }
        let authenticator = self
            .authenticator
            .as_ref()
            .ok_or_else(|| WalletError::AuthenticationRequired(wallet.security_level.to_string()))?;

        if authenticator.authenticate(reason).await? {
            Ok(())
        } else {
            warn!(wallet_id = %wallet.id, "signing declined by user");
            Err(WalletError::AuthenticationFailed("user declined".into()))
        }
    }
}

fn check_signer(
    wallet: &Wallet,
    digest: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<(), WalletError> {
    let recovered = recover_address(digest, signature)?;
    if recovered.eq_ignore_ascii_case(&wallet.address) {
        Ok(())
    } else {
        Err(WalletError::SigningFailed(format!(
            "signature recovers to {recovered}, expected {}",
            wallet.address
        )))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use chain_evm::transaction::{recover_signer, transaction_hash};

    use super::*;
    use crate::auth::HardwareWallet;
    use crate::hd_derivation::DerivedKey;
    use crate::keystore::MemorySecureStorage;
    use crate::transaction::FeeModel;
    use crate::wallet::SecurityLevel;

    const ABANDON_12: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const TO: &str = "0x742d35cc6634c0532925a3b8d4c9db96c4b4d8b6";

    struct FixedAnswer(Result<bool, ()>);

    #[async_trait]
    impl Authenticator for FixedAnswer {
        async fn authenticate(&self, _: &str) -> Result<bool, WalletError> {
            self.0.map_err(|_| WalletError::BiometricNotAvailable)
        }
    }

    struct SoftDevice([u8; 32]);

    #[async_trait]
    impl HardwareWallet for SoftDevice {
        async fn get_public_key(&self, _: &str) -> Result<Vec<u8>, WalletError> {
            Ok(DerivedKey::from_private_key(&self.0, None)?
                .public_key_uncompressed
                .to_vec())
        }

        async fn sign_digest(&self, digest: [u8; 32], _: &str) -> Result<RecoverableSignature, WalletError> {
            Ok(sign_hash(&digest, &self.0)?)
        }
    }

    /// Returns the mirrored high-s form of every signature.
    struct HighSDevice([u8; 32]);

    #[async_trait]
    impl HardwareWallet for HighSDevice {
        async fn get_public_key(&self, path: &str) -> Result<Vec<u8>, WalletError> {
            SoftDevice(self.0).get_public_key(path).await
        }

        async fn sign_digest(&self, digest: [u8; 32], _: &str) -> Result<RecoverableSignature, WalletError> {
            let low = sign_hash(&digest, &self.0)?;
            let order = U256::from_str_radix(
                "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
                16,
            )
            .unwrap();
            let high_s = order - U256::from_be_bytes(low.s);
            Ok(RecoverableSignature {
                r: low.r,
                s: high_s.to_be_bytes::<32>(),
                y_parity: low.y_parity ^ 1,
            })
        }
    }

    fn key_one() -> [u8; 32] {
        let mut key = [0u8; 32];
        key[31] = 1;
        key
    }

    async fn setup() -> (Arc<KeyManager>, Wallet) {
        let keys = Arc::new(KeyManager::new(Arc::new(MemorySecureStorage::new())));
        let wallet = keys.import_wallet(ABANDON_12, "Main").await.unwrap();
        (keys, wallet)
    }

    fn tx_from(wallet: &Wallet) -> Transaction {
        Transaction::new(
            wallet.address.clone(),
            TO,
            "100000000000000000",
            1,
            FeeModel::FeeMarket {
                max_fee: 30_000_000_000,
                max_priority_fee: 1_000_000_000,
            },
        )
        .with_nonce(4)
    }

    #[tokio::test]
    async fn signs_and_recovers_wallet_address() {
        let (keys, wallet) = setup().await;
        let signer = Signer::new(keys.clone());
        let tx = tx_from(&wallet);

        let signed = signer.sign(&tx, &wallet.id).await.unwrap();
        assert_eq!(signed.signer, wallet.address);
        assert_eq!(signed.hash(), transaction_hash(&signed.raw));
        assert_eq!(signed.raw[0], 0x02);

        let recovered = recover_signer(&tx.to_evm().unwrap(), &signed.signature).unwrap();
        assert_eq!(recovered, wallet.address);
        assert!(keys.get(&wallet.id).await.unwrap().last_used.is_some());
    }

    #[tokio::test]
    async fn signing_is_deterministic() {
        let (keys, wallet) = setup().await;
        let signer = Signer::new(keys);
        let tx = tx_from(&wallet);
        let a = signer.sign(&tx, &wallet.id).await.unwrap();
        let b = signer.sign(&tx, &wallet.id).await.unwrap();
        assert_eq!(a.raw, b.raw);
        assert_eq!(a.hash(), b.hash());
    }

    #[tokio::test]
    async fn invalid_transaction_never_reaches_storage() {
        let (keys, wallet) = setup().await;
        let signer = Signer::new(keys);
        let mut tx = tx_from(&wallet);
        tx.value = "-1".into();
        assert!(matches!(
            signer.sign(&tx, &wallet.id).await,
            Err(WalletError::InvalidTransaction(_))
        ));
    }

    #[tokio::test]
    async fn foreign_sender_rejected() {
        let (keys, wallet) = setup().await;
        let signer = Signer::new(keys);
        let mut tx = tx_from(&wallet);
        tx.from = TO.into();
        assert!(matches!(
            signer.sign(&tx, &wallet.id).await,
            Err(WalletError::SigningFailed(_))
        ));
    }

    #[tokio::test]
    async fn high_security_needs_authenticator() {
        let (keys, wallet) = setup().await;
        keys.set_security_level(&wallet.id, SecurityLevel::High)
            .await
            .unwrap();
        let tx = tx_from(&wallet);

        let bare = Signer::new(keys.clone());
        assert!(matches!(
            bare.sign(&tx, &wallet.id).await,
            Err(WalletError::AuthenticationRequired(_))
        ));

        let declined = Signer::new(keys.clone()).with_authenticator(Arc::new(FixedAnswer(Ok(false))));
        assert!(matches!(
            declined.sign(&tx, &wallet.id).await,
            Err(WalletError::AuthenticationFailed(_))
        ));

        let unavailable = Signer::new(keys.clone()).with_authenticator(Arc::new(FixedAnswer(Err(()))));
        assert!(matches!(
            unavailable.sign(&tx, &wallet.id).await,
            Err(WalletError::BiometricNotAvailable)
        ));

        let approved = Signer::new(keys).with_authenticator(Arc::new(FixedAnswer(Ok(true))));
        approved.sign(&tx, &wallet.id).await.unwrap();
    }

    #[tokio::test]
    async fn watch_only_cannot_sign() {
        let keys = Arc::new(KeyManager::new(Arc::new(MemorySecureStorage::new())));
        let wallet = keys.import_watch_only(TO, "Watch").await.unwrap();
        let signer = Signer::new(keys);
        let tx = Transaction::new(TO, TO, "0", 1, FeeModel::Legacy { gas_price: 1 });
        assert!(matches!(
            signer.sign(&tx, &wallet.id).await,
            Err(WalletError::SigningUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn hardware_wallet_signs_on_device() {
        let keys = Arc::new(
            KeyManager::new(Arc::new(MemorySecureStorage::new()))
                .with_hardware(Arc::new(SoftDevice(key_one()))),
        );
        let wallet = keys
            .register_hardware_wallet("Device", "m/44'/60'/0'/0/0")
            .await
            .unwrap();
        assert_eq!(wallet.address, "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
        assert_eq!(wallet.security_level, SecurityLevel::High);

        let signer = Signer::new(keys);
        let signed = signer.sign(&tx_from(&wallet), &wallet.id).await.unwrap();
        assert_eq!(signed.signer, wallet.address);
    }

    #[tokio::test]
    async fn hardware_signature_is_stored_low_s() {
        let keys = Arc::new(
            KeyManager::new(Arc::new(MemorySecureStorage::new()))
                .with_hardware(Arc::new(HighSDevice(key_one()))),
        );
        let wallet = keys
            .register_hardware_wallet("Device", "m/44'/60'/0'/0/0")
            .await
            .unwrap();
        let tx = tx_from(&wallet);

        let signed = Signer::new(keys).sign(&tx, &wallet.id).await.unwrap();
        let reference = sign_hash(&signing_hash(&tx.to_evm().unwrap()), &key_one()).unwrap();
        assert_eq!(signed.signature, reference);
        assert_eq!(signed.raw, encode_signed(&tx.to_evm().unwrap(), &reference));
    }

    #[tokio::test]
    async fn broadcast_record_is_not_signed_again() {
        let (keys, wallet) = setup().await;
        let signer = Signer::new(keys);
        let sent = tx_from(&wallet).broadcasted("0xabc").unwrap();
        assert!(matches!(
            signer.sign(&sent, &wallet.id).await,
            Err(WalletError::InvalidTransition { from: "broadcast", to: "signed" })
        ));
    }

    #[tokio::test]
    async fn message_signature_recovers() {
        let (keys, wallet) = setup().await;
        let signer = Signer::new(keys);
        let rsv = signer.sign_message(b"hello", &wallet.id).await.unwrap();
        assert!(rsv[64] == 27 || rsv[64] == 28);

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&rsv[..32]);
        s.copy_from_slice(&rsv[32..64]);
        let signature = RecoverableSignature {
            r,
            s,
            y_parity: rsv[64] - 27,
        };
        let recovered = recover_address(&personal_message_hash(b"hello"), &signature).unwrap();
        assert_eq!(recovered, wallet.address);
    }
}
