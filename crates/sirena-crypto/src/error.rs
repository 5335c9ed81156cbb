//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA or DES encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// RSA or DES decryption failed (wrong key, bad padding)
    #[error("decryption failed")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key file could not be parsed (corrupted, wrong format or wrong password)
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Invalid message format
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Signing failed
    #[error("signing failed")]
    SigningFailed,

    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}
