//! Header encoding and decoding for the Sirena wire protocol.
//!
//! Every frame starts with a fixed 100-byte header followed by
//! `message_length` bytes of body. All multi-byte fields are big-endian.
//!
//! ```text
//!  0               4               8              12
//! +---------------+---------------+---------------+--------------------------+
//! | message_length|  created_at   |  message_id   |  reserved (32 bytes)     |
//! +---------------+-------+---+---+---------------+--------------------------+
//! 44              48      49  50              54                         100
//! +---------------+-------+---+---------------+------------------------------+
//! |  client_id    | flags |ver|    key_id     |  reserved (46 bytes)         |
//! +---------------+-------+---+---------------+------------------------------+
//! ```
//!
//! Reserved bytes, `version` and `key_id` are opaque to the client and
//! carried through verbatim.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::FrameError;
use crate::{HEADER_SIZE, SUBHEADER_SIZE};

const RESERVED_HEAD_SIZE: usize = 32;
const RESERVED_TAIL_SIZE: usize = 46;

/// Header flags bitmap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    /// Body is zlib compressed (never set by this client)
    pub const ZIPPED: u8 = 0b0000_0100;
    /// Body is DES-encrypted with the session key
    pub const USE_SYMMETRIC: u8 = 0b0000_1000;
    /// Body is RSA-encrypted with the server public key
    pub const USE_ENCRYPT: u8 = 0b0100_0000;

    /// Create new empty flags
    pub fn new() -> Self {
        Self(0)
    }

    /// Create flags from a raw byte
    pub fn from_u8(raw: u8) -> Self {
        Self(raw)
    }

    /// Add USE_ENCRYPT flag
    pub fn with_encrypt(mut self) -> Self {
        self.0 |= Self::USE_ENCRYPT;
        self
    }

    /// Add USE_SYMMETRIC flag
    pub fn with_symmetric(mut self) -> Self {
        self.0 |= Self::USE_SYMMETRIC;
        self
    }

    /// Check if USE_ENCRYPT is set
    pub fn use_encrypt(&self) -> bool {
        self.0 & Self::USE_ENCRYPT != 0
    }

    /// Check if USE_SYMMETRIC is set
    pub fn use_symmetric(&self) -> bool {
        self.0 & Self::USE_SYMMETRIC != 0
    }

    /// Check if ZIPPED is set
    pub fn is_zipped(&self) -> bool {
        self.0 & Self::ZIPPED != 0
    }

    /// Get raw byte value
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// Decoded frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Length of the body that follows the header
    pub message_length: u32,
    /// Request build time, seconds since the Unix epoch
    pub created_at: u32,
    /// Correlation ID, echoed by the server
    pub message_id: u32,
    /// Client identifier from configuration, echoed by the server
    pub client_id: u32,
    /// Flags bitmap
    pub flags: HeaderFlags,
    /// Protocol version byte
    pub version: u8,
    /// Server key identifier
    pub key_id: u32,
    /// Reserved bytes 12..44
    pub reserved_head: [u8; RESERVED_HEAD_SIZE],
    /// Reserved bytes 54..100
    pub reserved_tail: [u8; RESERVED_TAIL_SIZE],
}

/// Inputs for [`Header::new`]
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderParams<'a> {
    /// Client identifier from configuration
    pub client_id: u32,
    /// Subheader bytes (key exchange only)
    pub subheader: &'a [u8],
    /// Message bytes
    pub message: &'a [u8],
    /// Message signature bytes (key exchange only)
    pub signature: &'a [u8],
    /// Body is RSA-encrypted
    pub use_encrypt: bool,
    /// Body is DES-encrypted
    pub use_symmetric: bool,
}

impl Header {
    /// Build a request header.
    ///
    /// Stamps `created_at` with the current time, draws a fresh message ID
    /// from [`next_message_id`] and sizes `message_length` to cover the
    /// subheader, message and signature.
    pub fn new(params: &HeaderParams<'_>) -> Self {
        let body_len = params.subheader.len() + params.message.len() + params.signature.len();

        let mut flags = HeaderFlags::new();
        if params.use_encrypt {
            flags = flags.with_encrypt();
        }
        if params.use_symmetric {
            flags = flags.with_symmetric();
        }

        let header = Self {
            message_length: body_len as u32,
            created_at: unix_now(),
            message_id: next_message_id(),
            client_id: params.client_id,
            flags,
            version: 0,
            key_id: 0,
            reserved_head: [0u8; RESERVED_HEAD_SIZE],
            reserved_tail: [0u8; RESERVED_TAIL_SIZE],
        };

        tracing::debug!(
            message_id = header.message_id,
            message_length = header.message_length,
            flags = header.flags.as_u8(),
            "Built request header"
        );

        header
    }

    /// Encode the header into its 100-byte wire form
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.message_length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.created_at.to_be_bytes());
        buf[8..12].copy_from_slice(&self.message_id.to_be_bytes());
        buf[12..44].copy_from_slice(&self.reserved_head);
        buf[44..48].copy_from_slice(&self.client_id.to_be_bytes());
        buf[48] = self.flags.as_u8();
        buf[49] = self.version;
        buf[50..54].copy_from_slice(&self.key_id.to_be_bytes());
        buf[54..100].copy_from_slice(&self.reserved_tail);
        buf
    }

    /// Decode a header from its 100-byte wire form.
    ///
    /// Decoding is total. A `message_length` of zero only comes from a
    /// malformed peer and must be treated as a framing error by the caller.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let u32_at =
            |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        let mut reserved_head = [0u8; RESERVED_HEAD_SIZE];
        reserved_head.copy_from_slice(&buf[12..44]);
        let mut reserved_tail = [0u8; RESERVED_TAIL_SIZE];
        reserved_tail.copy_from_slice(&buf[54..100]);

        Self {
            message_length: u32_at(0),
            created_at: u32_at(4),
            message_id: u32_at(8),
            client_id: u32_at(44),
            flags: HeaderFlags(buf[48]),
            version: buf[49],
            key_id: u32_at(50),
            reserved_head,
            reserved_tail,
        }
    }

    /// Parse a header from the front of a byte slice
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let buf: &[u8; HEADER_SIZE] = data
            .get(..HEADER_SIZE)
            .and_then(|head| head.try_into().ok())
            .ok_or(FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            })?;
        Ok(Self::decode(buf))
    }

    /// Check that a reply header echoes the request's `client_id` and `created_at`
    pub fn echoes(&self, request: &Header) -> Result<(), String> {
        if self.client_id != request.client_id {
            return Err(format!(
                "request client ID ({}) != response client ID ({})",
                request.client_id, self.client_id
            ));
        }
        if self.created_at != request.created_at {
            return Err(format!(
                "request created at ({}) != response created at ({})",
                request.created_at, self.created_at
            ));
        }
        Ok(())
    }
}

/// Build the key-exchange subheader: the encrypted key length as big-endian u32
pub fn make_subheader(encrypted_key: &[u8]) -> Vec<u8> {
    let mut subheader = Vec::with_capacity(SUBHEADER_SIZE);
    subheader.extend_from_slice(&(encrypted_key.len() as u32).to_be_bytes());
    subheader
}

static NEXT_MESSAGE_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate a message ID.
///
/// Monotonically increasing across the process, wraps below 2^32 and
/// never returns zero.
pub fn next_message_id() -> u32 {
    let mut id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
    while id == 0 {
        // Counter wrapped; zero marks an unset ID on the wire.
        id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
    }
    id
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}
