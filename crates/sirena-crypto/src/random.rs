//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use rand_core::RngCore;

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| CryptoError::RandomFailed)
}

/// Generate `len` random alphanumeric ASCII characters.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_string(len: usize) -> Result<Vec<u8>, CryptoError> {
    // OsRng panics on failure inside sample_iter; probe it fallibly first.
    fill_random(&mut [0u8; 1])?;
    Ok(OsRng.sample_iter(&Alphanumeric).take(len).collect())
}
