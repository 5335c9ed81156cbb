//! Crypto envelope: RSA wrapping of the session key and DES payloads.
//!
//! ## Key exchange
//!
//! ```text
//! client                                        server
//!   ciphertext = RSA(K, server_pub)
//!   signature  = Sign(ciphertext, client_priv)
//!   ── subheader ‖ ciphertext ‖ signature ───────►
//!                                               K = RSA⁻¹(ciphertext)
//!   ◄──────────── prefix(4) ‖ RSA(K, client_pub) ‖ ...
//!   K' = RSA⁻¹(message[4..132]); K' must equal K
//! ```

use sirena_crypto::{CryptoError, PrivateKey, PublicKey, RSA_CIPHERTEXT_SIZE, SessionKey, symmetric};

use crate::SUBHEADER_SIZE;
use crate::header::make_subheader;

/// Wrapped session key ready to be framed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExchange {
    /// Session key encrypted to the server
    pub ciphertext: Vec<u8>,
    /// Client signature over `ciphertext`
    pub signature: Vec<u8>,
    /// Subheader describing `ciphertext`
    pub subheader: Vec<u8>,
}

/// Encrypt the session key to the server and sign the ciphertext.
///
/// # Errors
///
/// Returns a [`CryptoError`] if encryption or signing fails.
pub fn wrap_session_key(
    key: &SessionKey,
    server_public: &PublicKey,
    client_private: &PrivateKey,
) -> Result<KeyExchange, CryptoError> {
    let ciphertext = server_public.encrypt(key.as_bytes())?;
    let signature = client_private.sign(&ciphertext)?;
    let subheader = make_subheader(&ciphertext);
    Ok(KeyExchange {
        ciphertext,
        signature,
        subheader,
    })
}

/// Recover the session key the server echoed back.
///
/// The first four bytes of `message` are server framing and are skipped;
/// the next 128 bytes are the key encrypted to the client.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidMessage`] if `message` is too short and
/// [`CryptoError::DecryptionFailed`] if decryption fails.
pub fn unwrap_session_key(
    message: &[u8],
    client_private: &PrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let end = SUBHEADER_SIZE + RSA_CIPHERTEXT_SIZE;
    let ciphertext = message.get(SUBHEADER_SIZE..end).ok_or_else(|| {
        CryptoError::InvalidMessage(format!(
            "key exchange reply is {} bytes, need at least {end}",
            message.len()
        ))
    })?;
    client_private.decrypt(ciphertext)
}

/// DES-encrypt an XML payload with a session key snapshot
pub fn encrypt_payload(xml: &[u8], key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    symmetric::encrypt(xml, key.as_bytes())
}

/// DES-decrypt a reply payload with the same session key snapshot
pub fn decrypt_payload(ciphertext: &[u8], key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    symmetric::decrypt(ciphertext, key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_PRIVATE: &[u8] = include_bytes!("../testdata/keys/client_private.pem");
    const CLIENT_PUBLIC: &[u8] = include_bytes!("../testdata/keys/client_public.pem");
    const SERVER_PRIVATE: &[u8] = include_bytes!("../testdata/keys/server_private.pem");
    const SERVER_PUBLIC: &[u8] = include_bytes!("../testdata/keys/server_public.pem");

    fn client_private() -> PrivateKey {
        PrivateKey::from_pem(CLIENT_PRIVATE, "sirena-test").unwrap()
    }

    #[test]
    fn test_wrap_then_server_side_unwrap() {
        let key = SessionKey::from_bytes(*b"AbCdEfGh");
        let server_public = PublicKey::from_pem(SERVER_PUBLIC).unwrap();
        let exchange = wrap_session_key(&key, &server_public, &client_private()).unwrap();

        assert_eq!(exchange.ciphertext.len(), RSA_CIPHERTEXT_SIZE);
        assert_eq!(exchange.subheader, make_subheader(&exchange.ciphertext));

        let server_private = PrivateKey::from_pem(SERVER_PRIVATE, "").unwrap();
        assert_eq!(server_private.decrypt(&exchange.ciphertext).unwrap(), b"AbCdEfGh");

        let client_public = PublicKey::from_pem(CLIENT_PUBLIC).unwrap();
        assert!(client_public.verify(&exchange.ciphertext, &exchange.signature).is_ok());
    }

    #[test]
    fn test_unwrap_skips_prefix_and_trailer() {
        let client_public = PublicKey::from_pem(CLIENT_PUBLIC).unwrap();
        let mut reply = vec![0xFF, 0xEE, 0xDD, 0xCC];
        reply.extend(client_public.encrypt(b"AbCdEfGh").unwrap());
        reply.extend_from_slice(b"trailing");

        assert_eq!(unwrap_session_key(&reply, &client_private()).unwrap(), b"AbCdEfGh");
    }

    #[test]
    fn test_unwrap_short_message() {
        assert!(matches!(
            unwrap_session_key(&[0u8; 100], &client_private()),
            Err(CryptoError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_unwrap_garbage_fails() {
        assert!(matches!(
            unwrap_session_key(&[0x5A; 132], &client_private()),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_payload_roundtrip() {
        let key = SessionKey::from_bytes(*b"12345678");
        let ciphertext = encrypt_payload(b"<sirena><query/></sirena>", &key).unwrap();
        assert_eq!(decrypt_payload(&ciphertext, &key).unwrap(), b"<sirena><query/></sirena>");
    }
}
