//! Scriptable in-process stand-in for the Sirena server.
//!
//! Speaks the client's framing: it accepts key-exchange requests, verifies
//! the client signature, echoes the session key encrypted to the client and
//! answers DES requests by replacing `query` with `answer` in the XML.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sirena_core::{HEADER_SIZE, Header, SUBHEADER_SIZE};
use sirena_crypto::{PrivateKey, PublicKey, symmetric};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{client_public_key, server_private_key};

/// Mock server behaviour
#[derive(Clone)]
pub struct MockSirena {
    server_private: PrivateKey,
    client_public: PublicKey,
    handshake_client_id_skew: u32,
    reject_handshakes_after: Option<usize>,
    xml_client_id_skew: u32,
    echo_wrong_key: bool,
    silent_xml: bool,
    reverse_batch: usize,
    slow_marker: Option<(Vec<u8>, Duration)>,
}

impl Default for MockSirena {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSirena {
    /// Well-behaved server using the fixture keys
    pub fn new() -> Self {
        Self {
            server_private: server_private_key(),
            client_public: client_public_key(),
            handshake_client_id_skew: 0,
            reject_handshakes_after: None,
            xml_client_id_skew: 0,
            echo_wrong_key: false,
            silent_xml: false,
            reverse_batch: 0,
            slow_marker: None,
        }
    }

    /// Add `skew` to the client ID of key-exchange replies
    pub fn handshake_client_id_skew(mut self, skew: u32) -> Self {
        self.handshake_client_id_skew = skew;
        self
    }

    /// Answer the first `count` handshakes normally, then echo a foreign client ID
    pub fn reject_handshakes_after(mut self, count: usize) -> Self {
        self.reject_handshakes_after = Some(count);
        self
    }

    /// Add `skew` to the client ID of XML replies
    pub fn xml_client_id_skew(mut self, skew: u32) -> Self {
        self.xml_client_id_skew = skew;
        self
    }

    /// Echo a freshly generated key instead of the client's
    pub fn echo_wrong_key(mut self) -> Self {
        self.echo_wrong_key = true;
        self
    }

    /// Never answer XML requests
    pub fn silent_xml(mut self) -> Self {
        self.silent_xml = true;
        self
    }

    /// Hold XML replies until `size` have queued, then send them newest first
    pub fn reverse_batch(mut self, size: usize) -> Self {
        self.reverse_batch = size;
        self
    }

    /// Delay replies to requests whose XML contains `marker`
    pub fn slow_on(mut self, marker: &str, delay: Duration) -> Self {
        self.slow_marker = Some((marker.as_bytes().to_vec(), delay));
        self
    }

    /// Serve one connection on `stream`
    pub fn spawn<S>(self, stream: S) -> MockHandle
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let state = Arc::new(MockState::default());
        let task = tokio::spawn(serve(self, stream, state.clone()));
        MockHandle { state, task }
    }

    /// Accept one TCP connection on an ephemeral port and serve it
    pub async fn listen(self) -> (String, MockHandle) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let address = listener.local_addr().expect("local addr").to_string();
        let state = Arc::new(MockState::default());
        let task_state = state.clone();
        let task = tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                serve(self, stream, task_state).await;
            }
        });
        (address, MockHandle { state, task })
    }
}

/// What the mock observed
#[derive(Debug, Default)]
pub struct MockState {
    session_key: Mutex<Option<Vec<u8>>>,
    handshakes: Mutex<Vec<Vec<u8>>>,
    xml_requests: Mutex<Vec<XmlRecord>>,
}

/// One XML request as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRecord {
    /// Message ID from the request header
    pub message_id: u32,
    /// Session key the request was decrypted with
    pub key: Vec<u8>,
    /// Decrypted XML
    pub xml: Vec<u8>,
}

/// Running mock server
#[derive(Debug)]
pub struct MockHandle {
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockHandle {
    /// Session key currently accepted by the mock
    pub fn session_key(&self) -> Option<Vec<u8>> {
        lock(&self.state.session_key).clone()
    }

    /// Every session key the mock accepted, in order
    pub fn handshakes(&self) -> Vec<Vec<u8>> {
        lock(&self.state.handshakes).clone()
    }

    /// Every XML request the mock decrypted, in arrival order
    pub fn xml_requests(&self) -> Vec<XmlRecord> {
        lock(&self.state.xml_requests).clone()
    }

    /// Drop the connection from the server side
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

type SharedWriter<S> = Arc<tokio::sync::Mutex<WriteHalf<S>>>;

async fn serve<S>(mock: MockSirena, stream: S, state: Arc<MockState>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let writer: SharedWriter<S> = Arc::new(tokio::sync::Mutex::new(writer));
    let mut batch: Vec<(Header, Vec<u8>)> = Vec::new();

    loop {
        let mut head = [0u8; HEADER_SIZE];
        if reader.read_exact(&mut head).await.is_err() {
            return;
        }
        let header = Header::decode(&head);
        let mut body = vec![0u8; header.message_length as usize];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }

        debug!(
            message_id = header.message_id,
            message_length = header.message_length,
            flags = header.flags.as_u8(),
            "Mock received frame"
        );

        if header.flags.use_encrypt() {
            let Some(reply) = mock.answer_key_exchange(&header, &body, &state) else {
                warn!(message_id = header.message_id, "Mock rejected key exchange");
                return;
            };
            write_frame(&*writer, &reply.0, &reply.1).await;
        } else if header.flags.use_symmetric() {
            if mock.silent_xml {
                continue;
            }
            let Some((reply, delay)) = mock.answer_xml(&header, &body, &state) else {
                warn!(message_id = header.message_id, "Mock cannot decrypt XML request");
                return;
            };
            if let Some(delay) = delay {
                let writer = writer.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    write_frame(&*writer, &reply.0, &reply.1).await;
                });
            } else if mock.reverse_batch > 0 {
                batch.push(reply);
                if batch.len() == mock.reverse_batch {
                    for (header, body) in batch.drain(..).rev() {
                        write_frame(&*writer, &header, &body).await;
                    }
                }
            } else {
                write_frame(&*writer, &reply.0, &reply.1).await;
            }
        }
    }
}

async fn write_frame<W: AsyncWrite>(writer: &tokio::sync::Mutex<W>, header: &Header, body: &[u8])
where
    W: Unpin,
{
    let mut header = header.clone();
    header.message_length = body.len() as u32;
    let mut frame = header.encode().to_vec();
    frame.extend_from_slice(body);

    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_all(&frame).await {
        debug!(message_id = header.message_id, error = %e, "Mock reply not written");
        return;
    }
    let _ = writer.flush().await;
    debug!(message_id = header.message_id, bytes = frame.len(), "Mock replied");
}

impl MockSirena {
    fn answer_key_exchange(
        &self,
        header: &Header,
        body: &[u8],
        state: &MockState,
    ) -> Option<(Header, Vec<u8>)> {
        let key_len = u32::from_be_bytes(body.get(..SUBHEADER_SIZE)?.try_into().ok()?) as usize;
        let ciphertext = body.get(SUBHEADER_SIZE..SUBHEADER_SIZE + key_len)?;
        let signature = body.get(SUBHEADER_SIZE + key_len..)?;

        self.client_public.verify(ciphertext, signature).ok()?;
        let key = self.server_private.decrypt(ciphertext).ok()?;

        let echoed = if self.echo_wrong_key {
            b"WRONGKEY".to_vec()
        } else {
            key.clone()
        };
        let mut reply = (key_len as u32).to_be_bytes().to_vec();
        reply.extend_from_slice(&self.client_public.encrypt(&echoed).ok()?);
        // Real servers append trailing data after the key.
        reply.extend_from_slice(b"\0\0\0\0");

        let mut skew = self.handshake_client_id_skew;
        {
            let mut handshakes = lock(&state.handshakes);
            if self
                .reject_handshakes_after
                .is_some_and(|count| handshakes.len() >= count)
            {
                skew = skew.wrapping_add(1);
            } else {
                handshakes.push(key.clone());
                *lock(&state.session_key) = Some(key);
            }
        }

        let mut header = header.clone();
        header.client_id = header.client_id.wrapping_add(skew);
        Some((header, reply))
    }

    #[allow(clippy::type_complexity)]
    fn answer_xml(
        &self,
        header: &Header,
        body: &[u8],
        state: &MockState,
    ) -> Option<((Header, Vec<u8>), Option<Duration>)> {
        let key = lock(&state.session_key).clone()?;
        let xml = symmetric::decrypt(body, &key).ok()?;
        lock(&state.xml_requests).push(XmlRecord {
            message_id: header.message_id,
            key: key.clone(),
            xml: xml.clone(),
        });

        let delay = self
            .slow_marker
            .as_ref()
            .filter(|(marker, _)| contains(&xml, marker))
            .map(|(_, delay)| *delay);

        let answer = String::from_utf8_lossy(&xml).replace("query", "answer");
        let ciphertext = symmetric::encrypt(answer.as_bytes(), &key).ok()?;

        let mut header = header.clone();
        header.client_id = header.client_id.wrapping_add(self.xml_client_id_skew);
        Some(((header, ciphertext), delay))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
