//! Response router: the single reader of the connection.
//!
//! Each iteration reads exactly one frame (`100-byte header ‖ body`) and
//! hands it to the waiter registered under the header's message ID.
//!
//! Any I/O error, framing error or reply for an ID nobody is waiting on is
//! fatal: there is no resync marker in the stream, so the router records the
//! reason on the [`Link`], wakes every waiter and exits.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::dispatcher::Link;
use crate::error::{Error, FrameError, Result};
use crate::header::Header;
use crate::message::Response;
use crate::{HEADER_SIZE, MAX_MESSAGE_LENGTH};

/// Reader half of the connection plus the shared link state
pub(crate) struct Router<R> {
    reader: BufReader<R>,
    link: Arc<Link>,
}

impl<R> Router<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub(crate) fn new(reader: R, link: Arc<Link>) -> Self {
        Self {
            reader: BufReader::new(reader),
            link,
        }
    }

    /// Run the router on its own task
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            let response = match self.read_frame().await {
                Ok(response) => response,
                Err(e) => {
                    self.link.fail(e.to_string());
                    return;
                }
            };
            if let Err(e) = self.deliver(response) {
                self.link.fail(e.to_string());
                return;
            }
        }
    }

    /// Read exactly one frame
    async fn read_frame(&mut self) -> Result<Response> {
        let mut header_buf = [0u8; HEADER_SIZE];
        self.reader
            .read_exact(&mut header_buf)
            .await
            .map_err(|e| Error::FatalTransport(format!("reading response header: {e}").into()))?;

        let header = Header::decode(&header_buf);
        trace!(header = %hex::encode(header_buf), "Raw response header");

        if header.message_length == 0 {
            return Err(FrameError::EmptyBody {
                message_id: header.message_id,
            }
            .into());
        }
        if header.message_length > MAX_MESSAGE_LENGTH {
            return Err(FrameError::Oversized {
                message_id: header.message_id,
                length: header.message_length,
            }
            .into());
        }

        let mut message = vec![0u8; header.message_length as usize];
        self.reader.read_exact(&mut message).await.map_err(|e| {
            Error::FatalTransport(
                format!("reading body of message {}: {e}", header.message_id).into(),
            )
        })?;

        debug!(
            message_id = header.message_id,
            message_length = header.message_length,
            "Response received"
        );

        Ok(Response { header, message })
    }

    /// Hand a frame to its waiter
    fn deliver(&self, response: Response) -> Result<()> {
        let message_id = response.header.message_id;
        let waiters = self.link.waiters();

        let Some(tx) = waiters.take(message_id) else {
            if waiters.take_expired(message_id) {
                warn!(message_id, "Dropping reply that arrived after its request timed out");
                return Ok(());
            }
            return Err(Error::FatalTransport(
                format!("no waiter for message ID {message_id}").into(),
            ));
        };

        if tx.send(response).is_err() {
            // Caller dropped its receiver between registration and delivery.
            debug!(message_id, "Reply receiver already gone");
        }
        Ok(())
    }
}
