//! Listener supervision
//!
//! A listener owns one configured port: it binds, accepts, and hands each
//! accepted connection to a session. Listeners on different ports are fully
//! independent tasks with no shared state.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use super::session::{Session, SessionError};
use super::{AcceptMode, ListenerConfig};
use crate::dispatch::Dispatcher;

/// Listener errors
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

pub type ListenerResult<T> = Result<T, ListenerError>;

/// A supervisor for one listening port
pub struct Listener {
    config: ListenerConfig,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Listener {
    pub fn new(config: ListenerConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Bind the configured address, keeping the listener ready to serve
    pub async fn bind(self) -> ListenerResult<BoundListener> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ListenerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        let local_addr = listener.local_addr()?;
        tracing::info!("Listening on {} ({:?} accept)", local_addr, self.config.accept_mode);

        Ok(BoundListener {
            listener,
            local_addr,
            config: self.config,
            dispatcher: self.dispatcher,
        })
    }

    /// Bind and serve in one step
    pub async fn run(self) -> ListenerResult<()> {
        self.bind().await?.serve().await
    }
}

/// A listener that has bound its port
pub struct BoundListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ListenerConfig,
    dispatcher: Arc<dyn Dispatcher>,
}

impl BoundListener {
    /// The actual bound address (resolves port 0 to the assigned port)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and serve connections per the configured accept mode
    pub async fn serve(self) -> ListenerResult<()> {
        match self.config.accept_mode {
            AcceptMode::Single => self.serve_single().await,
            AcceptMode::Loop => self.serve_loop().await,
        }
    }

    /// Accept exactly one connection and drive its session to completion
    async fn serve_single(self) -> ListenerResult<()> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::info!("Client {} connected on {}", peer, self.local_addr);

        let session = Session::new(
            stream,
            peer,
            self.dispatcher.clone(),
            self.config.read_timeout(),
        );

        let stats = session.run().await?;
        tracing::info!(
            "Session with {} ended after {} messages; listener on {} stopping",
            peer,
            stats.frames_received,
            self.local_addr
        );

        Ok(())
    }

    /// Accept indefinitely, one spawned session per connection
    async fn serve_loop(self) -> ListenerResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::info!("Client {} connected on {}", peer, self.local_addr);

                    let session = Session::new(
                        stream,
                        peer,
                        self.dispatcher.clone(),
                        self.config.read_timeout(),
                    );

                    tokio::spawn(async move {
                        match session.run().await {
                            Ok(stats) => tracing::info!(
                                "Session with {} ended after {} messages",
                                peer,
                                stats.frames_received
                            ),
                            Err(e) => tracing::error!("Session with {} failed: {}", peer, e),
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept failed on {}: {}", self.local_addr, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{StandardDispatcher, URI_GET_SERVER_NAME};
    use crate::network::ProbeClient;
    use crate::protocol::{encode_request, word_to_frame, MESSAGE_SIZE_BYTES};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config(mode: AcceptMode) -> ListenerConfig {
        let mut config = ListenerConfig::new(0).with_accept_mode(mode);
        config.bind_address = "127.0.0.1".to_string();
        config
    }

    #[tokio::test]
    async fn single_mode_serves_one_connection_then_stops() {
        let listener = Listener::new(
            test_config(AcceptMode::Single),
            Arc::new(StandardDispatcher::new()),
        );
        let bound = listener.bind().await.unwrap();
        let addr = bound.local_addr();
        let handle = tokio::spawn(bound.serve());

        let mut client = ProbeClient::connect(addr).await.unwrap();
        let exchange = client.send_request(URI_GET_SERVER_NAME).await.unwrap();
        assert_eq!(exchange.confirm_id, 1);
        assert_eq!(exchange.response_id, 1);
        drop(client);

        // The listener finishes once its only session ends
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn loop_mode_serves_connections_back_to_back() {
        let listener = Listener::new(
            test_config(AcceptMode::Loop),
            Arc::new(StandardDispatcher::new()),
        );
        let bound = listener.bind().await.unwrap();
        let addr = bound.local_addr();
        let _serve = tokio::spawn(bound.serve());

        for _ in 0..2 {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client
                .write_all(&word_to_frame(encode_request(URI_GET_SERVER_NAME)))
                .await
                .unwrap();

            // Confirm then response; each fresh connection starts at id 1
            let mut frame = [0u8; MESSAGE_SIZE_BYTES];
            client.read_exact(&mut frame).await.unwrap();
            let (id, _) = crate::protocol::decode_reply(u64::from_be_bytes(frame));
            assert_eq!(id, 1);

            client.read_exact(&mut frame).await.unwrap();
        }
    }
}
