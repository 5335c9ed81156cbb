//! Waiter table: message ID → single-use reply slot.
//!
//! A waiter is registered before its request is written, so the router can
//! never observe a reply whose waiter is missing. The router removes the
//! waiter and delivers outside the map's shard lock.
//!
//! Waiters reaped on timeout move to a short-lived "recently expired" set,
//! which lets the router drop a late reply quietly instead of treating the
//! unknown ID as stream corruption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::message::Response;

/// How long an expired message ID is remembered
pub const EXPIRED_RETENTION: Duration = Duration::from_secs(60);

/// Reply sender held by the table
pub type ReplySender = oneshot::Sender<Response>;

/// Reply receiver handed to the caller
pub type ReplyReceiver = oneshot::Receiver<Response>;

/// Concurrent table of in-flight requests
#[derive(Debug, Default)]
pub struct WaiterTable {
    pending: DashMap<u32, ReplySender>,
    expired: DashMap<u32, Instant>,
    closed: AtomicBool,
}

impl WaiterTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `message_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the ID is already in flight and
    /// [`Error::FatalTransport`] if the table has been closed.
    pub fn register(&self, message_id: u32) -> Result<ReplyReceiver> {
        if self.is_closed() {
            return Err(Error::fatal("connection closed"));
        }

        let (tx, rx) = oneshot::channel();
        match self.pending.entry(message_id) {
            Entry::Occupied(_) => {
                tracing::error!(message_id, "Message ID already in flight");
                return Err(Error::invalid_request("message ID already in flight"));
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        // close() may have drained the table between the check and the insert
        if self.is_closed() {
            self.pending.remove(&message_id);
            return Err(Error::fatal("connection closed"));
        }

        Ok(rx)
    }

    /// Remove the waiter for `message_id` so its reply can be delivered
    pub fn take(&self, message_id: u32) -> Option<ReplySender> {
        self.pending.remove(&message_id).map(|(_, tx)| tx)
    }

    /// Remove a waiter without remembering it (write failure)
    pub fn remove(&self, message_id: u32) -> bool {
        self.pending.remove(&message_id).is_some()
    }

    /// Reap a waiter whose caller gave up, remembering its ID for late replies
    pub fn expire(&self, message_id: u32) -> bool {
        if self.pending.remove(&message_id).is_none() {
            return false;
        }
        let now = Instant::now();
        self.expired
            .retain(|_, at| now.duration_since(*at) < EXPIRED_RETENTION);
        self.expired.insert(message_id, now);
        true
    }

    /// Check (and forget) whether `message_id` was recently expired
    pub fn take_expired(&self, message_id: u32) -> bool {
        self.expired.remove(&message_id).is_some()
    }

    /// Drop every waiter; their callers observe a closed connection
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.clear();
        self.expired.clear();
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a waiter for `message_id` is registered
    pub fn contains(&self, message_id: u32) -> bool {
        self.pending.contains_key(&message_id)
    }

    /// Number of in-flight requests
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no requests are in flight
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
