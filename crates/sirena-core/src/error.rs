//! Error types for the Sirena transport.
//!
//! # Error Categories
//!
//! - **Caller errors**: [`Error::InvalidRequest`], [`Error::NotReady`], [`Error::Config`]
//! - **Recoverable**: [`Error::Crypto`], [`Error::Protocol`], [`Error::Timeout`]; the
//!   client stays usable
//! - **Fatal**: [`Error::FatalTransport`], [`Error::Handshake`]; the client must be
//!   dropped and rebuilt

use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum Error {
    /// Caller violated a request precondition
    #[error("invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    /// No session key installed yet
    #[error("client not ready: {0}")]
    NotReady(Cow<'static, str>),

    /// Cryptographic primitive failed
    #[error("crypto error: {0}")]
    Crypto(#[from] sirena_crypto::CryptoError),

    /// Server reply does not match the request
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No reply within the request timeout
    #[error("no reply for message {message_id} within {timeout:?}")]
    Timeout {
        /// Message ID of the abandoned request
        message_id: u32,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Connection is broken and unusable
    #[error("fatal transport error: {0}")]
    FatalTransport(Cow<'static, str>),

    /// Session key exchange failed
    #[error("handshake failed: {0}")]
    Handshake(Cow<'static, str>),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(Cow<'static, str>),

    /// Frame decoding error
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Frame-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer too short to hold a header
    #[error("frame too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Header announces an empty body
    #[error("header for message {message_id} has zero message length")]
    EmptyBody {
        /// Message ID from the offending header
        message_id: u32,
    },

    /// Header announces a body larger than the router accepts
    #[error("header for message {message_id} announces {length} bytes")]
    Oversized {
        /// Message ID from the offending header
        message_id: u32,
        /// Announced body length
        length: u32,
    },
}

impl Error {
    /// Returns true if the client can no longer be used after this error
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalTransport(_) | Error::Handshake(_))
    }

    /// Create an invalid request error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_request(context: &'static str) -> Self {
        Error::InvalidRequest(Cow::Borrowed(context))
    }

    /// Create a not ready error with static context (zero allocation)
    #[must_use]
    pub const fn not_ready(context: &'static str) -> Self {
        Error::NotReady(Cow::Borrowed(context))
    }

    /// Create a handshake error with static context (zero allocation)
    #[must_use]
    pub const fn handshake(context: &'static str) -> Self {
        Error::Handshake(Cow::Borrowed(context))
    }

    /// Create a fatal transport error with static context (zero allocation)
    #[must_use]
    pub const fn fatal(context: &'static str) -> Self {
        Error::FatalTransport(Cow::Borrowed(context))
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;
