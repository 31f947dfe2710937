use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication tag mismatch, wrong key, or tampered ciphertext.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("key derivation failed: {0}")]
    KdfFailed(String),

    /// The operating system random source refused to produce bytes.
    #[error("secure random source unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_decryption_failed() {
        let err = CryptoError::DecryptionFailed("tag mismatch".into());
        assert_eq!(err.to_string(), "decryption failed: tag mismatch");
    }

    #[test]
    fn display_randomness_unavailable() {
        let err = CryptoError::RandomnessUnavailable("getrandom: EAGAIN".into());
        assert_eq!(
            err.to_string(),
            "secure random source unavailable: getrandom: EAGAIN"
        );
    }

    #[test]
    fn display_kdf_failed() {
        let err = CryptoError::KdfFailed("out of memory".into());
        assert_eq!(err.to_string(), "key derivation failed: out of memory");
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> =
            Box::new(CryptoError::InvalidInput("empty salt".into()));
        assert!(err.to_string().contains("empty salt"));
    }
}
