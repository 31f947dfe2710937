use rand_core::{OsRng, RngCore};

use crate::error::CryptoError;

/// Fills a fixed-size array from the operating system random source.
///
/// Unlike `RngCore::fill_bytes`, exhaustion or failure of the source is
/// reported instead of panicking, so key generation can surface it.
pub fn try_random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CryptoError::RandomnessUnavailable(e.to_string()))?;
    Ok(buf)
}
