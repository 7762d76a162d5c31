//! Session handling for WordWire
//!
//! A session owns one accepted connection and drives it through the
//! protocol cycle: read an 8-byte frame, acknowledge it, interpret it,
//! dispatch requests, reply. The cycle repeats until the peer closes the
//! connection or a write fails.

use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::dispatch::{Dispatcher, Resolution};
use crate::protocol::{self, Message, MESSAGE_SIZE_BYTES};

/// Session errors. Only transport-fatal conditions surface here; read
/// timeouts are handled inside the loop.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Write failed: {0}")]
    WriteFailed(io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Per-session traffic counters
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Full 8-byte frames received
    pub frames_received: u64,
    /// Confirms written
    pub confirms_sent: u64,
    /// Responses written
    pub responses_sent: u64,
    /// Read cycles that hit the idle timeout
    pub read_timeouts: u64,
}

/// Outcome of one read cycle
enum ReadOutcome {
    Frame(u64),
    IdleTimeout,
    PeerClosed,
}

/// One accepted connection and its protocol state
pub struct Session {
    /// Remote peer address
    peer_addr: SocketAddr,
    /// The TCP stream, owned until the session ends
    stream: TcpStream,
    /// Idle timeout for each read cycle
    read_timeout: Duration,
    /// Inbound message counter; incremented once per full frame, never reset
    message_counter: u64,
    /// Capability table for resolving request uris
    dispatcher: Arc<dyn Dispatcher>,
    /// Write buffer
    write_buf: BytesMut,
    /// Traffic counters
    stats: SessionStats,
}

impl Session {
    /// Create a session over an established stream
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        dispatcher: Arc<dyn Dispatcher>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            peer_addr,
            stream,
            read_timeout,
            message_counter: 0,
            dispatcher,
            write_buf: BytesMut::with_capacity(MESSAGE_SIZE_BYTES * 2),
            stats: SessionStats::default(),
        }
    }

    /// Get the remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the traffic counters
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Drive the connection until it ends.
    ///
    /// Returns the final counters on orderly shutdown by the peer; returns
    /// an error only for transport-fatal conditions (failed write, a read
    /// error that is not a timeout or an orderly close).
    pub async fn run(mut self) -> SessionResult<SessionStats> {
        tracing::info!("Session with {} started", self.peer_addr);

        loop {
            match self.read_word().await? {
                ReadOutcome::IdleTimeout => {
                    // Transient: the peer simply has nothing to say yet
                    self.stats.read_timeouts += 1;
                    tracing::warn!("Read from {} timed out, still waiting", self.peer_addr);
                    continue;
                }
                ReadOutcome::PeerClosed => {
                    tracing::info!("Peer {} closed the connection", self.peer_addr);
                    return Ok(self.stats);
                }
                ReadOutcome::Frame(word) => {
                    self.stats.frames_received += 1;
                    self.handle_frame(word).await?;
                }
            }
        }
    }

    /// Process one fully received frame: acknowledge, interpret, dispatch.
    async fn handle_frame(&mut self, word: u64) -> SessionResult<()> {
        self.message_counter += 1;
        tracing::debug!(
            "Received frame {:#018x} from {} (message {})",
            word,
            self.peer_addr,
            self.message_counter
        );

        // Liveness signal: every full frame is confirmed before it is
        // interpreted, whatever its kind turns out to be.
        let confirm = Message::Confirm {
            request_id: self.message_counter,
        };
        self.send_word(confirm.encode()).await?;
        self.stats.confirms_sent += 1;

        match Message::decode(word) {
            Message::Request { uri } => {
                let data = match self.dispatcher.resolve(uri) {
                    Resolution::Value(value) => value,
                    Resolution::Unknown => {
                        tracing::warn!("Unknown request uri {:#x} from {}", uri, self.peer_addr);
                        0
                    }
                };

                let response = Message::Response {
                    request_id: self.message_counter,
                    data,
                };
                self.send_word(response.encode()).await?;
                self.stats.responses_sent += 1;
                tracing::debug!(
                    "Sent response {} (data {:#x}) to {}",
                    self.message_counter,
                    data,
                    self.peer_addr
                );
            }
            Message::Confirm { request_id } => {
                // The server never solicits confirms from the client
                tracing::warn!(
                    "Unexpected confirm (id {}) from {}",
                    request_id,
                    self.peer_addr
                );
            }
            other => {
                tracing::warn!("Unhandled {} message from {}", other.kind(), self.peer_addr);
            }
        }

        Ok(())
    }

    /// Read one 8-byte frame, bounded by the idle timeout.
    ///
    /// A timeout discards any partial bytes already read in this cycle; the
    /// client is expected to retransmit the full message.
    async fn read_word(&mut self) -> SessionResult<ReadOutcome> {
        let mut frame = [0u8; MESSAGE_SIZE_BYTES];

        match tokio::time::timeout(self.read_timeout, self.stream.read_exact(&mut frame)).await {
            Ok(Ok(_)) => Ok(ReadOutcome::Frame(protocol::frame_to_word(frame))),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // Includes a disconnect mid-frame: the partial message is
                // discarded without a confirm
                Ok(ReadOutcome::PeerClosed)
            }
            Ok(Err(e)) => {
                tracing::error!("Read from {} failed: {}", self.peer_addr, e);
                Err(e.into())
            }
            Err(_) => Ok(ReadOutcome::IdleTimeout),
        }
    }

    /// Write one frame in network byte order. Any failure is fatal for the
    /// session.
    async fn send_word(&mut self, word: u64) -> SessionResult<()> {
        self.write_buf.clear();
        protocol::write_frame(word, &mut self.write_buf);

        self.stream
            .write_all(&self.write_buf)
            .await
            .map_err(SessionError::WriteFailed)?;
        self.stream
            .flush()
            .await
            .map_err(SessionError::WriteFailed)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_kind, decode_reply, encode_request, MessageKind};
    use tokio::net::TcpListener;

    /// Doubles the uri; uri 0x99 is deliberately unknown
    struct DoublingDispatcher;

    impl Dispatcher for DoublingDispatcher {
        fn resolve(&self, uri: u64) -> Resolution {
            if uri == 0x99 {
                Resolution::Unknown
            } else {
                Resolution::Value(uri * 2)
            }
        }
    }

    async fn spawn_session(
        read_timeout: Duration,
    ) -> (TcpStream, tokio::task::JoinHandle<SessionResult<SessionStats>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();

        let session = Session::new(stream, peer, Arc::new(DoublingDispatcher), read_timeout);
        let handle = tokio::spawn(session.run());

        (client, handle)
    }

    async fn read_word_from(client: &mut TcpStream) -> u64 {
        let mut frame = [0u8; MESSAGE_SIZE_BYTES];
        client.read_exact(&mut frame).await.unwrap();
        protocol::frame_to_word(frame)
    }

    #[tokio::test]
    async fn request_yields_confirm_then_response() {
        let (mut client, handle) = spawn_session(Duration::from_secs(5)).await;

        client
            .write_all(&protocol::word_to_frame(encode_request(21)))
            .await
            .unwrap();

        let confirm = read_word_from(&mut client).await;
        assert_eq!(decode_kind(confirm), MessageKind::Confirm);
        assert_eq!(decode_reply(confirm).0, 1);

        let response = read_word_from(&mut client).await;
        assert_eq!(decode_kind(response), MessageKind::Response);
        assert_eq!(decode_reply(response), (1, 42));

        drop(client);
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.confirms_sent, 1);
        assert_eq!(stats.responses_sent, 1);
    }

    #[tokio::test]
    async fn counter_increases_across_requests() {
        let (mut client, handle) = spawn_session(Duration::from_secs(5)).await;

        for (i, uri) in [(1u64, 10u64), (2, 11), (3, 12)] {
            client
                .write_all(&protocol::word_to_frame(encode_request(uri)))
                .await
                .unwrap();

            let confirm = read_word_from(&mut client).await;
            assert_eq!(decode_reply(confirm).0, i);

            let response = read_word_from(&mut client).await;
            assert_eq!(decode_reply(response), (i, uri * 2));
        }

        drop(client);
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_received, 3);
    }

    #[tokio::test]
    async fn inbound_confirm_is_acked_but_not_answered() {
        let (mut client, handle) = spawn_session(Duration::from_secs(5)).await;

        // A confirm from the client is unexpected; it still gets the
        // unconditional ack, and nothing else
        let stray = Message::Confirm { request_id: 9 }.encode();
        client
            .write_all(&protocol::word_to_frame(stray))
            .await
            .unwrap();

        let confirm = read_word_from(&mut client).await;
        assert_eq!(decode_kind(confirm), MessageKind::Confirm);
        assert_eq!(decode_reply(confirm).0, 1);

        // Next request still sees the shared counter at 2
        client
            .write_all(&protocol::word_to_frame(encode_request(5)))
            .await
            .unwrap();
        let confirm = read_word_from(&mut client).await;
        assert_eq!(decode_reply(confirm).0, 2);
        let response = read_word_from(&mut client).await;
        assert_eq!(decode_reply(response), (2, 10));

        drop(client);
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.confirms_sent, 3);
        assert_eq!(stats.responses_sent, 1);
    }

    #[tokio::test]
    async fn unknown_uri_still_gets_a_response() {
        let (mut client, handle) = spawn_session(Duration::from_secs(5)).await;

        client
            .write_all(&protocol::word_to_frame(encode_request(0x99)))
            .await
            .unwrap();

        let _confirm = read_word_from(&mut client).await;
        let response = read_word_from(&mut client).await;
        assert_eq!(decode_kind(response), MessageKind::Response);
        assert_eq!(decode_reply(response), (1, 0));

        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_timeout_keeps_session_open() {
        let (mut client, handle) = spawn_session(Duration::from_millis(100)).await;

        // Stay silent long enough for at least one timeout cycle
        tokio::time::sleep(Duration::from_millis(250)).await;

        client
            .write_all(&protocol::word_to_frame(encode_request(8)))
            .await
            .unwrap();

        let confirm = read_word_from(&mut client).await;
        assert_eq!(decode_kind(confirm), MessageKind::Confirm);
        let response = read_word_from(&mut client).await;
        assert_eq!(decode_reply(response), (1, 16));

        drop(client);
        let stats = handle.await.unwrap().unwrap();
        assert!(stats.read_timeouts >= 1);
        assert_eq!(stats.frames_received, 1);
    }

    #[tokio::test]
    async fn partial_frame_then_disconnect_closes_without_confirm() {
        let (mut client, handle) = spawn_session(Duration::from_secs(5)).await;

        client.write_all(&[0xAA, 0xBB, 0xCC, 0xDD]).await.unwrap();
        drop(client);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_received, 0);
        assert_eq!(stats.confirms_sent, 0);
    }
}
