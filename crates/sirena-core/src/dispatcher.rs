//! Request dispatcher: frame, register, write, await.
//!
//! # Ordering
//!
//! ```text
//! caller ── register waiter ── enqueue frame ──► writer task ──► socket
//!                 │                                                 │
//!                 └──────────── reply ◄── router task ◄─────────────┘
//! ```
//!
//! The waiter is registered before the frame is queued, so the router can
//! never see a reply without a waiter. A single writer task owns the write
//! half; frames are written whole and never interleave, even if the caller
//! that queued one is cancelled mid-write.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::router::Router;
use crate::waiters::{ReplyReceiver, WaiterTable};

/// Frames queued ahead of the writer before callers wait for room
const WRITE_QUEUE_DEPTH: usize = 256;

/// Connection state shared by the dispatcher, the router and the writer
#[derive(Debug, Default)]
pub(crate) struct Link {
    waiters: WaiterTable,
    failure: OnceLock<String>,
}

impl Link {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn waiters(&self) -> &WaiterTable {
        &self.waiters
    }

    /// Mark the connection unusable. The first reason wins.
    pub(crate) fn fail(&self, reason: String) {
        if self.failure.set(reason).is_ok() {
            error!(reason = self.failure().unwrap_or_default(), "Connection failed");
        }
        self.waiters.close();
    }

    pub(crate) fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    fn check(&self) -> Result<()> {
        match self.failure() {
            Some(reason) => Err(Error::FatalTransport(reason.to_owned().into())),
            None => Ok(()),
        }
    }

    fn closed_error(&self) -> Error {
        Error::FatalTransport(
            self.failure()
                .unwrap_or("connection closed")
                .to_owned()
                .into(),
        )
    }
}

struct Outbound {
    message_id: u32,
    bytes: Vec<u8>,
    written: oneshot::Sender<std::result::Result<(), String>>,
}

/// Multiplexes requests over one connection
pub struct Dispatcher {
    link: Arc<Link>,
    outbound: mpsc::Sender<Outbound>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl Dispatcher {
    /// Split `stream` and start the router and writer tasks
    pub fn start<S>(stream: S, request_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let link = Arc::new(Link::new());
        let (outbound, queue) = mpsc::channel(WRITE_QUEUE_DEPTH);

        let router = Router::new(reader, link.clone()).spawn();
        let writer = tokio::spawn(run_writer(writer, queue, link.clone()));

        Self {
            link,
            outbound,
            tasks: Mutex::new(vec![router, writer]),
            request_timeout,
        }
    }

    /// Queue a request and return a handle to its reply.
    ///
    /// Resolves once the whole frame has been written to the socket.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the message ID is zero, the body is empty,
    ///   the header length disagrees with the body, or the ID is already in flight
    /// - [`Error::FatalTransport`] if the connection has failed or the write fails
    pub async fn send_async(&self, request: &Request) -> Result<PendingReply> {
        let header = &request.header;
        if header.message_id == 0 {
            return Err(Error::invalid_request("header has no message ID"));
        }
        if header.message_length == 0 {
            return Err(Error::invalid_request("request body is empty"));
        }
        if header.message_length as usize != request.body_len() {
            return Err(Error::InvalidRequest(
                format!(
                    "header message length {} != body length {}",
                    header.message_length,
                    request.body_len()
                )
                .into(),
            ));
        }
        self.link.check()?;

        let message_id = header.message_id;
        let rx = self.link.waiters().register(message_id)?;
        let mut pending = PendingReply {
            message_id,
            rx: Some(rx),
            link: self.link.clone(),
        };

        let (written, written_rx) = oneshot::channel();
        let frame = Outbound {
            message_id,
            bytes: request.to_bytes(),
            written,
        };
        if self.outbound.send(frame).await.is_err() {
            pending.discard();
            return Err(self.link.closed_error());
        }

        match written_rx.await {
            Ok(Ok(())) => Ok(pending),
            Ok(Err(reason)) => {
                pending.discard();
                Err(Error::FatalTransport(reason.into()))
            }
            Err(_) => {
                pending.discard();
                Err(self.link.closed_error())
            }
        }
    }

    /// Send a request and wait for its reply, bounded by the request timeout.
    ///
    /// On timeout the waiter is reaped; the socket itself is left alone and a
    /// reply arriving later is dropped by the router.
    ///
    /// # Errors
    ///
    /// Everything [`send_async`](Self::send_async) returns, plus
    /// [`Error::Timeout`] when no reply arrives in time.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let pending = self.send_async(request).await?;
        let message_id = pending.message_id();

        match tokio::time::timeout(self.request_timeout, pending.recv()).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the timed-out PendingReply expired the waiter.
                error!(
                    message_id,
                    timeout = ?self.request_timeout,
                    "No reply from Sirena"
                );
                Err(Error::Timeout {
                    message_id,
                    timeout: self.request_timeout,
                })
            }
        }
    }

    /// Declare the connection dead and stop the router and writer
    pub fn fail(&self, reason: impl Into<String>) {
        self.link.fail(reason.into());
        self.abort_tasks();
    }

    /// Why the connection failed, if it has
    pub fn failure(&self) -> Option<String> {
        self.link.failure().map(str::to_owned)
    }

    /// Table of in-flight requests
    pub fn waiters(&self) -> &WaiterTable {
        self.link.waiters()
    }

    /// How long [`send`](Self::send) waits for a reply
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.link.waiters().len())
            .field("failure", &self.link.failure())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Handle to a reply that has not arrived yet.
///
/// Dropping it before the reply arrives reaps the waiter; a reply that
/// shows up afterwards is dropped quietly by the router.
#[derive(Debug)]
pub struct PendingReply {
    message_id: u32,
    rx: Option<ReplyReceiver>,
    link: Arc<Link>,
}

impl PendingReply {
    /// Message ID this reply is correlated by
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FatalTransport`] if the connection fails first.
    pub async fn recv(mut self) -> Result<Response> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(self.link.closed_error());
        };
        let result = rx.await;
        self.rx = None;
        result.map_err(|_| self.link.closed_error())
    }

    fn discard(&mut self) {
        if self.rx.take().is_some() {
            self.link.waiters().remove(self.message_id);
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.rx.take().is_some() && self.link.waiters().expire(self.message_id) {
            debug!(message_id = self.message_id, "Reaped abandoned waiter");
        }
    }
}

async fn run_writer<W>(mut writer: W, mut queue: mpsc::Receiver<Outbound>, link: Arc<Link>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        let result = match writer.write_all(&frame.bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(
                    message_id = frame.message_id,
                    bytes = frame.bytes.len(),
                    "Request written"
                );
                let _ = frame.written.send(Ok(()));
            }
            Err(e) => {
                let reason = format!("writing message {}: {e}", frame.message_id);
                link.fail(reason.clone());
                let _ = frame.written.send(Err(reason));
                break;
            }
        }
    }

    // Frames still queued can never be written.
    queue.close();
    while let Some(frame) = queue.recv().await {
        warn!(message_id = frame.message_id, "Dropping unwritten request");
    }
}
