//! # Sirena Crypto
//!
//! Cryptographic collaborators for the Sirena transport.
//!
//! This crate provides:
//! - RSA key loading from PEM (SPKI / PKCS#1 public keys, PKCS#8 / PKCS#1 private keys,
//!   password-protected PKCS#8)
//! - RSA encryption, decryption, signing and verification
//! - DES encryption for bulk XML payloads
//! - Printable session key generation from the OS CSPRNG
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Key transport | RSA PKCS#1 v1.5 | 1024-bit server key, 128-byte ciphertext |
//! | Key signature | RSA PKCS#1 v1.5 + SHA-1 | client key, optionally password protected |
//! | Payload | DES-ECB + PKCS#7 | 8-byte session key |
//!
//! The suite is dictated by the Sirena server and is not negotiable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod asymmetric;
pub mod error;
pub mod random;
pub mod symmetric;

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

pub use asymmetric::{PrivateKey, PublicKey};
pub use error::CryptoError;

/// Session key size in bytes
pub const SESSION_KEY_SIZE: usize = 8;

/// DES block size in bytes
pub const DES_BLOCK_SIZE: usize = 8;

/// RSA ciphertext size for the 1024-bit keys the server issues
pub const RSA_CIPHERTEXT_SIZE: usize = 128;

/// Symmetric key negotiated with the server and used for DES payloads.
///
/// The bytes are printable ASCII so the server can log and compare them.
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Generate a fresh random printable key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let chars = random::random_string(SESSION_KEY_SIZE)?;
        Self::from_slice(&chars)
    }

    /// Create a key from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a key from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not exactly 8 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SESSION_KEY_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_SIZE,
                actual: slice.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Get the raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}
