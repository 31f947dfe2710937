use bip32::{DerivationPath, XPrv};
use chain_evm::address::pubkey_to_address;
use k256::ecdsa::SigningKey;
use zeroize::Zeroize;

use crate::error::WalletError;

/// BIP-44 path for EVM accounts: `m/44'/60'/account'/0/index`.
///
/// Every EVM chain shares coin type 60; replay protection comes from the
/// chain id at signing time.
pub fn evm_derivation_path(account: u32, index: u32) -> String {
    format!("m/44'/60'/{account}'/0/{index}")
}

/// Derives the secp256k1 key at `path` from a BIP-39 seed.
pub fn derive_secp256k1_key(seed: &[u8], path: &str) -> Result<DerivedKey, WalletError> {
    let parsed: DerivationPath = path
        .parse()
        .map_err(|e: bip32::Error| WalletError::DerivationFailed(e.to_string()))?;

    let xprv = XPrv::derive_from_path(seed, &parsed)
        .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;

    let mut private_key: [u8; 32] = xprv.to_bytes().into();
    let derived = DerivedKey::from_private_key(&private_key, Some(path.to_string()));
    private_key.zeroize();
    derived
}

/// A secp256k1 key pair and its EVM address. The private half is wiped on
/// drop.
pub struct DerivedKey {
    pub private_key: [u8; 32],
    pub public_key_uncompressed: [u8; 65],
    /// Checksummed address.
    pub address: String,
    pub derivation_path: Option<String>,
}

impl DerivedKey {
    pub fn from_private_key(
        private_key: &[u8; 32],
        derivation_path: Option<String>,
    ) -> Result<Self, WalletError> {
        let signing_key = SigningKey::from_bytes(private_key.into())
            .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;

        let public_key_uncompressed: [u8; 65] = signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .try_into()
            .map_err(|_| WalletError::DerivationFailed("invalid uncompressed public key".into()))?;

        let address = pubkey_to_address(&public_key_uncompressed)?;

        Ok(Self {
            private_key: *private_key,
            public_key_uncompressed,
            address,
            derivation_path,
        })
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_uncompressed)
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}
