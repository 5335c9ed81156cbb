//! RSA key handling for the Sirena key exchange.
//!
//! The server hands out a 1024-bit public key; the client owns an RSA
//! private key that is usually stored as password-protected PKCS#8.
//!
//! ## Operations
//!
//! - [`PublicKey::encrypt`]: PKCS#1 v1.5 encryption (session key transport)
//! - [`PrivateKey::decrypt`]: PKCS#1 v1.5 decryption (server's key echo)
//! - [`PrivateKey::sign`] / [`PublicKey::verify`]: PKCS#1 v1.5 over SHA-1
//!
//! ## Usage
//!
//! ```ignore
//! use sirena_crypto::{PrivateKey, PublicKey};
//!
//! let server = PublicKey::from_pem(&std::fs::read("server.pub")?)?;
//! let client = PrivateKey::from_pem(&std::fs::read("client.pem")?, "password")?;
//!
//! let ciphertext = server.encrypt(b"AbCdEfGh")?;
//! let signature = client.sign(&ciphertext)?;
//! ```

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::CryptoError;

/// RSA public key (server key, or the client key on the server side)
#[derive(Clone, Debug)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Parse a PEM encoded public key.
    ///
    /// Accepts `BEGIN PUBLIC KEY` (SPKI) and `BEGIN RSA PUBLIC KEY` (PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the PEM is neither.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CryptoError> {
        let pem = pem_str(pem)?;
        let inner = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Modulus size in bytes (ciphertext and signature length)
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Encrypt `data` with PKCS#1 v1.5 padding.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if `data` is too long for the modulus.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Verify a PKCS#1 v1.5 SHA-1 signature over `data`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if verification fails.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let signature = Signature::try_from(signature).map_err(|_| CryptoError::InvalidSignature)?;
        VerifyingKey::<Sha1>::new(self.inner.clone())
            .verify(data, &signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// RSA private key (client key, or the server key on the server side)
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Parse a PEM encoded private key.
    ///
    /// With a non-empty `password` the PEM must be an encrypted PKCS#8
    /// document (`BEGIN ENCRYPTED PRIVATE KEY`). With an empty password
    /// plain PKCS#8 and PKCS#1 (`BEGIN RSA PRIVATE KEY`) are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the PEM cannot be parsed
    /// or the password is wrong.
    pub fn from_pem(pem: &[u8], password: &str) -> Result<Self, CryptoError> {
        let pem = pem_str(pem)?;
        let inner = if password.is_empty() {
            RsaPrivateKey::from_pkcs8_pem(pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
                .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?
        } else {
            RsaPrivateKey::from_pkcs8_encrypted_pem(pem, password.as_bytes())
                .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?
        };
        Ok(Self { inner })
    }

    /// Public half of this key
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.to_public_key(),
        }
    }

    /// Decrypt a PKCS#1 v1.5 ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] on padding or length errors.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Sign `data` with PKCS#1 v1.5 over a SHA-1 digest.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if the key cannot produce a signature.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature = SigningKey::<Sha1>::new(self.inner.clone())
            .try_sign(data)
            .map_err(|_| CryptoError::SigningFailed)?;
        Ok(signature.to_vec())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &(self.inner.size() * 8))
            .finish_non_exhaustive()
    }
}

fn pem_str(pem: &[u8]) -> Result<&str, CryptoError> {
    std::str::from_utf8(pem).map_err(|_| CryptoError::InvalidKeyMaterial("PEM is not UTF-8".into()))
}
