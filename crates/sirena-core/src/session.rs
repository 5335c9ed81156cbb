//! Session key management: handshake and periodic rekey.
//!
//! # Handshake Flow
//!
//! ```text
//! Client                                             Server
//!    |                                                  |
//!    |-- UseEncrypt: subheader ‖ RSA(K) ‖ Sign(RSA(K)) ->|
//!    |                                                  |
//!    |<------------- prefix ‖ RSA(K) (echoed header) ----|
//!    |                                                  |
//!    |         [K installed as the session key]         |
//! ```
//!
//! The handshake runs through the same dispatcher as ordinary traffic.
//! Requests snapshot the installed key before encrypting, so a rekey that
//! lands mid-flight never changes the key a request decrypts its reply with.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sirena_crypto::{PrivateKey, PublicKey, SessionKey};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::envelope::{unwrap_session_key, wrap_session_key};
use crate::error::{Error, Result};
use crate::message::Request;

/// Atomically replaceable session key
#[derive(Debug, Default)]
pub struct KeySlot {
    current: RwLock<Option<Arc<SessionKey>>>,
}

impl KeySlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to the installed key, if any
    pub fn snapshot(&self) -> Option<Arc<SessionKey>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the installed key
    pub fn install(&self, key: SessionKey) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(key));
    }

    /// Whether a key is installed
    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }
}

/// Negotiates session keys with the server
#[derive(Debug)]
pub struct SessionManager {
    dispatcher: Arc<Dispatcher>,
    config: Arc<Config>,
    key: Arc<KeySlot>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(dispatcher: Arc<Dispatcher>, config: Arc<Config>, key: Arc<KeySlot>) -> Self {
        Self {
            dispatcher,
            config,
            key,
        }
    }

    /// Generate a session key, have the server confirm it and install it.
    ///
    /// Key files are read from configuration on every call, so rotated
    /// files are picked up by the next rekey.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if a key file cannot be read
    /// - [`Error::Crypto`] if a key cannot be parsed or a primitive fails
    /// - [`Error::Handshake`] if the reply does not echo the request or the key
    /// - anything [`Dispatcher::send`] returns
    pub async fn create_and_sign_key(&self) -> Result<()> {
        debug!("Starting session key handshake");

        let key = SessionKey::generate()?;
        let (server_public, client_private) = self.load_keys()?;

        let exchange = wrap_session_key(&key, &server_public, &client_private)?;
        let request = Request::key_exchange(
            self.config.client_id,
            exchange.subheader,
            exchange.ciphertext,
            exchange.signature,
        );
        let message_id = request.header.message_id;

        let response = self.dispatcher.send(&request).await?;

        response
            .header
            .echoes(&request.header)
            .map_err(|e| Error::Handshake(e.into()))?;

        let echoed = unwrap_session_key(&response.message, &client_private)?;
        if echoed.as_slice() != key.as_bytes().as_slice() {
            return Err(Error::handshake(
                "server echoed a different session key",
            ));
        }

        self.key.install(key);
        info!(message_id, "Session key signed by Sirena");
        Ok(())
    }

    /// Refresh the session key every `interval` until a refresh fails.
    ///
    /// A failed refresh leaves the client without a trustworthy key, so it
    /// fails the connection and ends the task.
    pub fn spawn_rekey(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                info!("Rekeying session");
                match self.create_and_sign_key().await {
                    Ok(()) => info!("Rekey complete"),
                    Err(e) => {
                        error!(error = %e, "Rekey failed");
                        self.dispatcher.fail(format!("rekey failed: {e}"));
                        return;
                    }
                }
            }
        })
    }

    /// Installed session key slot
    pub fn key_slot(&self) -> &Arc<KeySlot> {
        &self.key
    }

    fn load_keys(&self) -> Result<(PublicKey, PrivateKey)> {
        let keys = &self.config.keys;
        let server_public = PublicKey::from_pem(&self.read_key(&keys.server_public_key)?)?;
        let client_private = PrivateKey::from_pem(
            &self.read_key(&keys.client_private_key)?,
            &keys.client_private_key_password,
        )?;
        Ok((server_public, client_private))
    }

    fn read_key(&self, path: &Path) -> Result<Vec<u8>> {
        self.config.get_key_file(path).inspect_err(|e| {
            error!(error = %e, "Cannot read key file");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_slot_swap_keeps_snapshots() {
        let slot = KeySlot::new();
        assert!(!slot.is_ready());
        assert!(slot.snapshot().is_none());

        slot.install(SessionKey::from_bytes(*b"OldKey01"));
        let before = slot.snapshot().unwrap();

        slot.install(SessionKey::from_bytes(*b"NewKey02"));
        let after = slot.snapshot().unwrap();

        assert_eq!(before.as_bytes(), b"OldKey01");
        assert_eq!(after.as_bytes(), b"NewKey02");
        assert!(slot.is_ready());
    }
}
