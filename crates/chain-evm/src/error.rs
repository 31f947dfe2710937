use thiserror::Error;

/// EVM encoding and signing errors.
#[derive(Debug, Error)]
pub enum EthError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("encoding error: {0}")]
    EncodingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_address() {
        let err = EthError::InvalidAddress("bad checksum".into());
        assert_eq!(err.to_string(), "invalid address: bad checksum");
    }

    #[test]
    fn display_invalid_signature() {
        let err = EthError::InvalidSignature("s out of range".into());
        assert_eq!(err.to_string(), "invalid signature: s out of range");
    }

    #[test]
    fn display_encoding_error() {
        let err = EthError::EncodingError("rlp overflow".into());
        assert_eq!(err.to_string(), "encoding error: rlp overflow");
    }
}
