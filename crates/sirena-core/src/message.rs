//! Request and response frames.

use crate::HEADER_SIZE;
use crate::header::{Header, HeaderParams};

/// Outbound frame: `header ‖ subheader? ‖ message ‖ signature?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Frame header
    pub header: Header,
    /// Key-exchange metadata, empty for ordinary requests
    pub subheader: Vec<u8>,
    /// Encrypted message body
    pub message: Vec<u8>,
    /// Signature over the message, empty for ordinary requests
    pub signature: Vec<u8>,
}

impl Request {
    /// Build a DES-encrypted request around `ciphertext`
    pub fn symmetric(client_id: u32, ciphertext: Vec<u8>) -> Self {
        let header = Header::new(&HeaderParams {
            client_id,
            message: &ciphertext,
            use_symmetric: true,
            ..Default::default()
        });
        Self {
            header,
            subheader: Vec::new(),
            message: ciphertext,
            signature: Vec::new(),
        }
    }

    /// Build an RSA-encrypted key-exchange request
    pub fn key_exchange(
        client_id: u32,
        subheader: Vec<u8>,
        ciphertext: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        let header = Header::new(&HeaderParams {
            client_id,
            subheader: &subheader,
            message: &ciphertext,
            signature: &signature,
            use_encrypt: true,
            ..Default::default()
        });
        Self {
            header,
            subheader,
            message: ciphertext,
            signature,
        }
    }

    /// Length of everything after the header
    pub fn body_len(&self) -> usize {
        self.subheader.len() + self.message.len() + self.signature.len()
    }

    /// Serialize the whole frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.body_len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.subheader);
        buf.extend_from_slice(&self.message);
        buf.extend_from_slice(&self.signature);
        buf
    }
}

/// Inbound frame: `header ‖ message`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Frame header
    pub header: Header,
    /// Message body (`message_length` bytes)
    pub message: Vec<u8>,
}
