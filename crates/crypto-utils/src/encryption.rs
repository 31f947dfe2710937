use aes_gcm::aead::{Aead, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};

use crate::error::CryptoError;

/// AES-256-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-256-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Seals `plaintext` under `key`, binding `aad` into the authentication tag.
///
/// Output layout: `[nonce (12) | ciphertext | tag (16)]`. The associated data
/// is not stored; `open` must be given the same bytes or it fails.
pub fn seal(plaintext: &[u8], key: &[u8; 32], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Opens a blob produced by [`seal`].
pub fn open(sealed: &[u8], key: &[u8; 32], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "sealed payload too short: expected at least {} bytes, got {}",
            NONCE_SIZE + TAG_SIZE,
            sealed.len()
        )));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), Payload { msg: ciphertext, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn seal_then_open() {
        let key = test_key();
        let sealed = seal(b"private key material", &key, b"wallet-1").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 20 + TAG_SIZE);

        let opened = open(&sealed, &key, b"wallet-1").unwrap();
        assert_eq!(opened, b"private key material");
    }

    #[test]
    fn open_with_other_aad_fails() {
        let key = test_key();
        let sealed = seal(b"secret", &key, b"wallet-1").unwrap();
        assert!(matches!(
            open(&sealed, &key, b"wallet-2"),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal(b"secret", &test_key(), b"").unwrap();
        let wrong = [0xFFu8; 32];
        assert!(open(&sealed, &wrong, b"").is_err());
    }

    #[test]
    fn open_tampered_fails() {
        let key = test_key();
        let mut sealed = seal(b"secret", &key, b"id").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&sealed, &key, b"id").is_err());
    }

    #[test]
    fn open_truncated_is_invalid_input() {
        let key = test_key();
        assert!(matches!(
            open(&[0u8; 10], &key, b""),
            Err(CryptoError::InvalidInput(_))
        ));
    }

    #[test]
    fn same_plaintext_seals_differently() {
        let key = test_key();
        let a = seal(b"same", &key, b"").unwrap();
        let b = seal(b"same", &key, b"").unwrap();
        assert_ne!(hex::encode(&a[..NONCE_SIZE]), hex::encode(&b[..NONCE_SIZE]));
    }
}
