use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::CryptoError;
use crate::random::try_random_bytes;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Low-cost parameters for tests and ephemeral stores. Never use these to
    /// protect secrets at rest.
    pub const fn insecure_fast() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for KdfParams {
    /// 64 MiB, 3 passes, 4 lanes.
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Derives a 32-byte AES-256 key from `password` and `salt` using Argon2id.
pub fn derive_key(
    password: &[u8],
    salt: &[u8; 16],
    params: KdfParams,
) -> Result<[u8; 32], CryptoError> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| CryptoError::KdfFailed(format!("invalid argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KdfFailed(format!("argon2 hash failed: {e}")))?;

    Ok(output)
}

/// Generates a random 16-byte salt.
pub fn generate_salt() -> Result<[u8; 16], CryptoError> {
    try_random_bytes::<16>()
}
