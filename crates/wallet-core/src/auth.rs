//! Capability interfaces for platform-specific confirmation channels.

use async_trait::async_trait;
use chain_evm::transaction::RecoverableSignature;

use crate::error::WalletError;

/// A remote signer holding keys on a separate device.
///
/// Implementations report an unplugged or locked device as
/// [`WalletError::HardwareWalletNotConnected`].
#[async_trait]
pub trait HardwareWallet: Send + Sync {
    /// SEC1 public key (33 or 65 bytes) at `path`.
    async fn get_public_key(&self, path: &str) -> Result<Vec<u8>, WalletError>;

    async fn sign_digest(
        &self,
        digest: [u8; 32],
        path: &str,
    ) -> Result<RecoverableSignature, WalletError>;
}

/// Biometric or passcode prompt.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(false)` means the user declined. `Err(BiometricNotAvailable)` means
    /// the platform has no way to ask.
    async fn authenticate(&self, reason: &str) -> Result<bool, WalletError>;
}
