//! WordWire probe client
//!
//! Connects to a server, sends Request frames, and collects the Confirm
//! and Response that come back for each. Backs the `send` subcommand and
//! the listener tests.

use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{self, Message, MessageKind, MESSAGE_SIZE_BYTES};

/// Probe client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Server closed the connection")]
    Closed,

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("Expected a {expected} message, got {got}")]
    UnexpectedMessage {
        expected: MessageKind,
        got: MessageKind,
    },
}

pub type ClientResult<T> = Result<T, ClientError>;

/// One request/confirm/response exchange as seen by the client
#[derive(Debug, Clone, Copy)]
pub struct Exchange {
    /// Request id carried by the server's Confirm
    pub confirm_id: u64,
    /// Request id carried by the server's Response
    pub response_id: u64,
    /// Response payload
    pub data: u64,
}

/// A connected probe client
pub struct ProbeClient {
    stream: TcpStream,
    server_addr: SocketAddr,
    reply_timeout: Duration,
    write_buf: BytesMut,
}

impl ProbeClient {
    /// Connect to a WordWire server
    pub async fn connect(server_addr: SocketAddr) -> ClientResult<Self> {
        let stream = TcpStream::connect(server_addr).await?;
        tracing::info!("Connected to {}", server_addr);

        Ok(Self {
            stream,
            server_addr,
            reply_timeout: Duration::from_secs(5),
            write_buf: BytesMut::with_capacity(MESSAGE_SIZE_BYTES),
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Send one Request and wait for its Confirm and Response
    pub async fn send_request(&mut self, uri: u64) -> ClientResult<Exchange> {
        let request = Message::Request { uri };

        self.write_buf.clear();
        protocol::write_frame(request.encode(), &mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        tracing::debug!("Sent request uri {:#x} to {}", uri, self.server_addr);

        let confirm_id = match self.read_message().await? {
            Message::Confirm { request_id } => request_id,
            other => {
                return Err(ClientError::UnexpectedMessage {
                    expected: MessageKind::Confirm,
                    got: other.kind(),
                })
            }
        };

        let (response_id, data) = match self.read_message().await? {
            Message::Response { request_id, data } => (request_id, data),
            other => {
                return Err(ClientError::UnexpectedMessage {
                    expected: MessageKind::Response,
                    got: other.kind(),
                })
            }
        };

        Ok(Exchange {
            confirm_id,
            response_id,
            data,
        })
    }

    /// Read one frame from the server, bounded by the reply timeout
    async fn read_message(&mut self) -> ClientResult<Message> {
        let mut frame = [0u8; MESSAGE_SIZE_BYTES];

        match tokio::time::timeout(self.reply_timeout, self.stream.read_exact(&mut frame)).await {
            Ok(Ok(_)) => Ok(Message::decode(protocol::frame_to_word(frame))),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ClientError::Closed),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ClientError::Timeout),
        }
    }
}
