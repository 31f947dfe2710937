//! Secure-storage capability and the two bundled backends.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use crypto_utils::encryption::{open, seal};
use crypto_utils::kdf::{derive_key, generate_salt, KdfParams};
use crypto_utils::{ZeroizingBytes, ZeroizingString};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::error::WalletError;

/// Where the engine keeps wallet secrets, keyed by wallet id.
///
/// Implementations must make `delete` crash-safe: after it returns `Ok`, the
/// secret is gone; after it returns `Err`, the secret is still readable.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn put(&self, key: &str, secret: ZeroizingBytes) -> Result<(), WalletError>;

    async fn get(&self, key: &str) -> Result<Option<ZeroizingBytes>, WalletError>;

    /// Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), WalletError>;

    async fn contains(&self, key: &str) -> Result<bool, WalletError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// What a wallet's secure-storage entry holds.
#[derive(Debug, PartialEq, Eq)]
pub enum StoredSecret {
    PrivateKey(ZeroizingBytes),
    Mnemonic {
        phrase: ZeroizingString,
        /// BIP-44 address index under account 0.
        index: u32,
    },
}

const TAG_PRIVATE_KEY: u8 = 0x01;
const TAG_MNEMONIC: u8 = 0x02;

impl StoredSecret {
    /// `0x01 || key[32]` or `0x02 || index_be[4] || phrase_utf8`.
    pub fn encode(&self) -> ZeroizingBytes {
        let mut out = Vec::new();
        match self {
            StoredSecret::PrivateKey(key) => {
                out.push(TAG_PRIVATE_KEY);
                out.extend_from_slice(key);
            }
            StoredSecret::Mnemonic { phrase, index } => {
                out.push(TAG_MNEMONIC);
                out.extend_from_slice(&index.to_be_bytes());
                out.extend_from_slice(phrase.as_bytes());
            }
        }
        ZeroizingBytes::new(out)
    }

    /// Anything unparseable is storage corruption, not user error.
    pub fn decode(bytes: &[u8]) -> Result<Self, WalletError> {
        let corrupt = |what: &str| WalletError::StorageError(format!("corrupt secret: {what}"));

        match bytes.split_first() {
            Some((&TAG_PRIVATE_KEY, key)) if key.len() == 32 => {
                Ok(StoredSecret::PrivateKey(ZeroizingBytes::from(key)))
            }
            Some((&TAG_PRIVATE_KEY, _)) => Err(corrupt("private key length")),
            Some((&TAG_MNEMONIC, rest)) if rest.len() > 4 => {
                let (index, phrase) = rest.split_at(4);
                let mut index_bytes = [0u8; 4];
                index_bytes.copy_from_slice(index);
                let phrase = std::str::from_utf8(phrase).map_err(|_| corrupt("mnemonic encoding"))?;
                Ok(StoredSecret::Mnemonic {
                    phrase: ZeroizingString::from(phrase),
                    index: u32::from_be_bytes(index_bytes),
                })
            }
            Some((&TAG_MNEMONIC, _)) => Err(corrupt("truncated mnemonic")),
            Some((tag, _)) => Err(corrupt(&format!("unknown tag {tag:#04x}"))),
            None => Err(corrupt("empty entry")),
        }
    }
}

/// In-process storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySecureStorage {
    entries: Mutex<HashMap<String, ZeroizingBytes>>,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn put(&self, key: &str, secret: ZeroizingBytes) -> Result<(), WalletError> {
        self.entries.lock().await.insert(key.to_string(), secret);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ZeroizingBytes>, WalletError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), WalletError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

const SALT_FILE: &str = "keystore.salt";
const CHECK_FILE: &str = "keystore.check";
const CHECK_PLAINTEXT: &[u8] = b"wallet-engine keystore v1";
const ENTRY_EXTENSION: &str = "secret";

/// One AES-256-GCM sealed file per entry under a directory, keyed by an
/// Argon2id password-derived key. The entry key is bound in as AAD, so a file
/// renamed onto another wallet id fails to open.
pub struct EncryptedFileStorage {
    dir: PathBuf,
    key: Zeroizing<[u8; 32]>,
}

impl EncryptedFileStorage {
    /// Opens (or initialises) a keystore directory.
    ///
    /// A wrong password on an existing keystore fails with
    /// `AuthenticationFailed`.
    pub fn open(
        dir: impl AsRef<Path>,
        password: &SecretString,
        params: KdfParams,
    ) -> Result<Self, WalletError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(io_error)?;

        let salt_path = dir.join(SALT_FILE);
        let salt: [u8; 16] = match std::fs::read(&salt_path) {
            Ok(bytes) => bytes
                .as_slice()
                .try_into()
                .map_err(|_| WalletError::StorageError("keystore salt is corrupt".into()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let salt = generate_salt()?;
                std::fs::write(&salt_path, salt).map_err(io_error)?;
                salt
            }
            Err(e) => return Err(io_error(e)),
        };

        let key = Zeroizing::new(derive_key(
            password.expose_secret().as_bytes(),
            &salt,
            params,
        )?);

        let check_path = dir.join(CHECK_FILE);
        match std::fs::read(&check_path) {
            Ok(sealed) => {
                let mut plain = open(&sealed, &key, CHECK_FILE.as_bytes()).map_err(|_| {
                    WalletError::AuthenticationFailed("keystore password is incorrect".into())
                })?;
                let matches = plain == CHECK_PLAINTEXT;
                plain.zeroize();
                if !matches {
                    return Err(WalletError::StorageError("keystore check is corrupt".into()));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let sealed = seal(CHECK_PLAINTEXT, &key, CHECK_FILE.as_bytes())?;
                std::fs::write(&check_path, sealed).map_err(io_error)?;
            }
            Err(e) => return Err(io_error(e)),
        }

        debug!(dir = %dir.display(), "encrypted keystore opened");
        Ok(Self { dir, key })
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, WalletError> {
        let safe = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(WalletError::StorageError(format!(
                "invalid storage key '{key}'"
            )));
        }
        Ok(self.dir.join(format!("{key}.{ENTRY_EXTENSION}")))
    }
}

#[async_trait]
impl SecureStorage for EncryptedFileStorage {
    async fn put(&self, key: &str, secret: ZeroizingBytes) -> Result<(), WalletError> {
        let path = self.entry_path(key)?;
        let sealed = seal(&secret, &self.key, key.as_bytes())?;

        // Write-then-rename so a crash never leaves a half-written entry.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &sealed).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ZeroizingBytes>, WalletError> {
        let path = self.entry_path(key)?;
        let sealed = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };

        let plain = open(&sealed, &self.key, key.as_bytes()).map_err(|e| {
            warn!(entry = key, "secure storage entry failed authentication");
            WalletError::StorageError(format!("entry '{key}' is corrupt: {e}"))
        })?;
        Ok(Some(ZeroizingBytes::new(plain)))
    }

    async fn delete(&self, key: &str) -> Result<(), WalletError> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

fn io_error(e: std::io::Error) -> WalletError {
    WalletError::StorageError(e.to_string())
}
