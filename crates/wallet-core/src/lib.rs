//! # wallet-core
//!
//! Multi-chain EVM wallet engine: key custody, network and token catalogs,
//! transaction building, signing, broadcast and confirmation tracking.
//!
//! The engine talks to the outside world only through capability traits:
//! [`SecureStorage`] for secrets, [`NetworkClient`] for chain access, and
//! [`HardwareWallet`] / [`Authenticator`] for device and user confirmation.

pub mod active;
pub mod auth;
pub mod builder;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod hd_derivation;
pub mod key_manager;
pub mod keystore;
pub mod mnemonic;
pub mod monitor;
pub mod network;
pub mod nonce;
pub mod registry;
pub mod signer;
pub mod telemetry;
pub mod token;
pub mod transaction;
pub mod validation;
pub mod wallet;

pub use active::ActiveNetwork;
pub use auth::{Authenticator, HardwareWallet};
pub use builder::{FeeStrategy, TransactionBuilder, TxRequest};
pub use client::{FeeHistory, NetworkClient, Page, TransactionInfo};
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineBuilder, WalletEngine};
pub use error::{NetworkError, RegistryError, TokenError, ValidationError, WalletError};
pub use key_manager::KeyManager;
pub use keystore::{EncryptedFileStorage, MemorySecureStorage, SecureStorage};
pub use monitor::{
    cancel_pair, BalanceUpdate, BalanceWatcher, CancelHandle, CancelSignal, MonitorOptions,
    MonitorOutcome, TrackedTx, TransactionMonitor,
};
pub use network::{Network, NetworkFeature, NetworkStatus};
pub use nonce::NonceTracker;
pub use registry::NetworkRegistry;
pub use signer::Signer;
pub use token::{Token, TokenKind, TokenRegistry, TokenStandard};
pub use transaction::{FeeModel, Receipt, SignedTransaction, Transaction, TxKind, TxStatus};
pub use wallet::{SecurityLevel, Wallet, WalletKind, WalletRecord};

pub use alloy_primitives::U256;
