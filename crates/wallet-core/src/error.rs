use alloy_primitives::U256;
use chain_evm::error::EthError;
use crypto_utils::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Insufficient balance: need {required} wei, have {available} wei")]
    InsufficientBalance { required: U256, available: U256 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authentication required for security level {0}")]
    AuthenticationRequired(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Secure storage is unreadable or corrupt. Callers should offer re-import
    /// from backup.
    #[error("Secure storage error: {0}")]
    StorageError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] ValidationError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),

    #[error("Biometric authentication is not available")]
    BiometricNotAvailable,

    #[error("Hardware wallet not connected: {0}")]
    HardwareWalletNotConnected(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Watch-only, multi-sig and smart-contract wallets hold no signing key.
    #[error("Wallet cannot sign: {0}")]
    SigningUnavailable(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Structural problems found by transaction validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid gas limit: {0}")]
    InvalidGasLimit(u64),

    #[error("invalid fee: {0}")]
    InvalidFee(String),

    #[error("invalid call data: {0}")]
    InvalidData(String),

    #[error("fee model does not match transaction kind: {0}")]
    FeeModelMismatch(String),

    #[error("chain {0} does not support fee-market transactions")]
    UnsupportedFeeMarket(u64),

    #[error("chain mismatch: transaction targets {actual}, network is {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Transport and node-side failures from a [`crate::client::NetworkClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("transaction rejected: {0}")]
    TransactionFailed(String),

    #[error("rate limited by RPC endpoint")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
}

impl NetworkError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NetworkError::Timeout | NetworkError::RateLimited | NetworkError::Unreachable(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("chain id {0} is already registered")]
    DuplicateChainId(u64),

    #[error("network id '{0}' is already registered")]
    DuplicateId(String),

    #[error("invalid {field} URL '{url}': {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token address: {0}")]
    InvalidAddress(String),

    #[error("decimals must be at most 18, got {0}")]
    InvalidDecimals(u8),

    #[error("token symbol is empty")]
    MissingSymbol,

    #[error("native asset must not carry a contract address")]
    NativeWithAddress,

    #[error("token {symbol} already registered on chain {chain_id}")]
    Duplicate { chain_id: u64, symbol: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount has more than {0} fractional digits")]
    PrecisionExceeded(u8),
}

impl From<CryptoError> for WalletError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed(msg) => WalletError::DecryptionFailed(msg),
            CryptoError::RandomnessUnavailable(msg) => WalletError::KeyGenerationFailed(msg),
            other => WalletError::EncryptionFailed(other.to_string()),
        }
    }
}

impl From<EthError> for WalletError {
    fn from(e: EthError) -> Self {
        match e {
            EthError::InvalidAddress(msg) => WalletError::InvalidAddress(msg),
            EthError::InvalidPrivateKey(msg) => WalletError::InvalidPrivateKey(msg),
            EthError::InvalidPublicKey(msg) => WalletError::DerivationFailed(msg),
            EthError::InvalidSignature(msg) | EthError::SigningError(msg) => {
                WalletError::SigningFailed(msg)
            }
            EthError::EncodingError(msg) => WalletError::TransactionFailed(msg),
        }
    }
}
