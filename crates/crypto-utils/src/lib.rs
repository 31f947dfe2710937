//! # crypto-utils
//!
//! Secret containers, secure randomness, authenticated encryption and
//! password-based key derivation shared by the wallet engine.

pub mod encryption;
pub mod error;
pub mod kdf;
pub mod random;
pub mod zeroizing;

pub use error::CryptoError;
pub use zeroizing::{ZeroizingBytes, ZeroizingString};
