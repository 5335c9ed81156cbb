//! DES payload encryption with the negotiated session key.
//!
//! Single DES in ECB mode with PKCS#7 padding, as the Sirena server expects.
//! Ciphertext length is always a non-zero multiple of [`DES_BLOCK_SIZE`].

use ecb::cipher::block_padding::Pkcs7;
use ecb::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};

use crate::{CryptoError, DES_BLOCK_SIZE, SESSION_KEY_SIZE};

type DesEcbEnc = ecb::Encryptor<des::Des>;
type DesEcbDec = ecb::Decryptor<des::Des>;

/// Encrypt `plaintext` with an 8-byte DES key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if `key` is not 8 bytes.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = DesEcbEnc::new_from_slice(key).map_err(|_| invalid_key(key))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt `ciphertext` with an 8-byte DES key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if `key` is not 8 bytes and
/// [`CryptoError::DecryptionFailed`] if the ciphertext is not block aligned
/// or its padding is invalid (usually a wrong key).
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = DesEcbDec::new_from_slice(key).map_err(|_| invalid_key(key))?;
    if ciphertext.is_empty() || ciphertext.len() % DES_BLOCK_SIZE != 0 {
        return Err(CryptoError::DecryptionFailed);
    }
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn invalid_key(key: &[u8]) -> CryptoError {
    CryptoError::InvalidKeyLength {
        expected: SESSION_KEY_SIZE,
        actual: key.len(),
    }
}
