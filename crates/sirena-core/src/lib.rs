//! # Sirena Core
//!
//! Client-side transport for the Sirena airline-reservation backend.
//!
//! This crate provides:
//! - Fixed 100-byte header encoding and decoding
//! - Request multiplexing over a single persistent connection
//! - RSA-protected session key handshake and periodic rekey
//! - DES-encrypted XML request/response exchange
//! - Error types and handling
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Client                                  │
//! │   (send encrypted XML, get decrypted XML)                       │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │       Session Manager        │          Envelope                │
//! │   (handshake, hourly rekey)  │   (RSA key wrap, DES payloads)   │
//! ├──────────────────────────────┴──────────────────────────────────┤
//! │             Dispatcher  ──►  socket  ──►  Router                │
//! │   (frame, register waiter,        (read frame, deliver to       │
//! │    serialized write)               waiter by message ID)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                        Header codec                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use sirena_core::{Client, ClientOptions, Config};
//!
//! # async fn run() -> sirena_core::Result<()> {
//! let config = Config::load("/etc/sirena/client.toml")?;
//! let client = Client::connect(config, ClientOptions::default()).await?;
//! let answer = client.send_xml_request(b"<sirena><query/></sirena>").await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod header;
pub mod message;
mod router;
pub mod session;
pub mod waiters;

use std::time::Duration;

pub use client::{Client, ClientOptions};
pub use config::{Config, KeysConfig};
pub use dispatcher::{Dispatcher, PendingReply};
pub use envelope::KeyExchange;
pub use error::{Error, FrameError, Result};
pub use header::{Header, HeaderFlags, HeaderParams, make_subheader, next_message_id};
pub use message::{Request, Response};
pub use session::{KeySlot, SessionManager};
pub use waiters::WaiterTable;

pub use sirena_crypto::SessionKey;

/// Fixed frame header size in bytes
pub const HEADER_SIZE: usize = 100;

/// Subheader size in bytes (key-exchange requests only)
pub const SUBHEADER_SIZE: usize = 4;

/// Largest body the router accepts before declaring the stream corrupt
pub const MAX_MESSAGE_LENGTH: u32 = 16 * 1024 * 1024;

/// How long [`Dispatcher::send`] waits for a reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between session key refreshes
pub const DEFAULT_REKEY_INTERVAL: Duration = Duration::from_secs(60 * 60);
