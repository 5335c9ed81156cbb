//! Client facade: one connection, one session key, many concurrent requests.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dispatcher::{Dispatcher, PendingReply};
use crate::envelope::{decrypt_payload, encrypt_payload};
use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::session::{KeySlot, SessionManager};
use crate::waiters::WaiterTable;
use crate::SessionKey;

/// Options for [`Client::connect`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientOptions {
    /// Skip the initial handshake and the rekey ticker
    pub test: bool,
}

/// Sirena client
///
/// Owns the connection, the waiter table and the session key. Cheap to
/// share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct Client {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    session: Arc<SessionManager>,
    rekey: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Connect to the configured server and negotiate a session key
    ///
    /// # Errors
    ///
    /// Returns [`Error::FatalTransport`] if the TCP dial fails and
    /// [`Error::Handshake`] if the initial key exchange fails.
    pub async fn connect(config: Config, options: ClientOptions) -> Result<Self> {
        config.validate()?;

        let stream = TcpStream::connect(&config.address).await.map_err(|e| {
            error!(address = %config.address, error = %e, "Cannot connect to Sirena");
            Error::FatalTransport(format!("connecting to {}: {e}", config.address).into())
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Cannot set TCP_NODELAY");
        }
        info!(address = %config.address, "Connected to Sirena");

        Self::with_stream(stream, config, options).await
    }

    /// Build a client over an already established stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the initial key exchange fails.
    pub async fn with_stream<S>(stream: S, config: Config, options: ClientOptions) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let config = Arc::new(config);
        let dispatcher = Arc::new(Dispatcher::start(stream, config.request_timeout()));
        let session = Arc::new(SessionManager::new(
            dispatcher.clone(),
            config.clone(),
            Arc::new(KeySlot::new()),
        ));

        let client = Self {
            config,
            dispatcher,
            session,
            rekey: Mutex::new(None),
        };

        if !options.test {
            client.session.create_and_sign_key().await.map_err(|e| {
                error!(error = %e, "Initial handshake failed");
                match e {
                    Error::Handshake(_) => e,
                    other => Error::Handshake(other.to_string().into()),
                }
            })?;

            let rekey = client
                .session
                .clone()
                .spawn_rekey(client.config.rekey_interval());
            *client.rekey_slot() = Some(rekey);
        }

        Ok(client)
    }

    /// Send an XML request and return the decrypted XML reply.
    ///
    /// The session key is captured before encryption and reused for
    /// decryption, so a concurrent rekey does not affect this request.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if no session key is installed
    /// - [`Error::Crypto`] if encryption or decryption fails
    /// - [`Error::Protocol`] if the reply does not echo the request header
    /// - anything [`Dispatcher::send`] returns
    pub async fn send_xml_request(&self, xml: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .session
            .key_slot()
            .snapshot()
            .ok_or_else(|| Error::not_ready("client has no session key"))?;

        let ciphertext = encrypt_payload(xml, &key)?;
        let request = Request::symmetric(self.config.client_id, ciphertext);

        let response = self.dispatcher.send(&request).await?;
        response.header.echoes(&request.header).map_err(|e| {
            error!(message_id = request.header.message_id, error = %e, "Reply header mismatch");
            Error::Protocol(e)
        })?;

        decrypt_payload(&response.message, &key).map_err(|e| {
            error!(message_id = request.header.message_id, error = %e, "Cannot decrypt reply");
            e.into()
        })
    }

    /// Queue a raw request; see [`Dispatcher::send_async`]
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send_async`].
    pub async fn send_async(&self, request: &Request) -> Result<PendingReply> {
        self.dispatcher.send_async(request).await
    }

    /// Send a raw request and wait for its reply; see [`Dispatcher::send`]
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn send(&self, request: &Request) -> Result<Response> {
        self.dispatcher.send(request).await
    }

    /// Negotiate a fresh session key now
    ///
    /// # Errors
    ///
    /// See [`SessionManager::create_and_sign_key`].
    pub async fn create_and_sign_key(&self) -> Result<()> {
        self.session.create_and_sign_key().await
    }

    /// Currently installed session key
    pub fn session_key(&self) -> Option<Arc<SessionKey>> {
        self.session.key_slot().snapshot()
    }

    /// Client identifier stamped on every request
    pub fn client_id(&self) -> u32 {
        self.config.client_id
    }

    /// Client configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Table of in-flight requests
    pub fn waiters(&self) -> &WaiterTable {
        self.dispatcher.waiters()
    }

    /// Number of in-flight requests
    pub fn pending_requests(&self) -> usize {
        self.waiters().len()
    }

    /// Whether a reply for `message_id` is still awaited
    pub fn is_waiting(&self, message_id: u32) -> bool {
        self.waiters().contains(message_id)
    }

    /// Whether the connection has failed
    pub fn is_closed(&self) -> bool {
        self.dispatcher.failure().is_some()
    }

    /// Why the connection failed, if it has
    pub fn close_reason(&self) -> Option<String> {
        self.dispatcher.failure()
    }

    /// Tear the connection down; in-flight and later requests fail
    pub fn close(&self) {
        if let Some(rekey) = self.rekey_slot().take() {
            rekey.abort();
        }
        self.dispatcher.fail("client closed");
    }

    fn rekey_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.rekey.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(rekey) = self.rekey_slot().take() {
            rekey.abort();
        }
    }
}
