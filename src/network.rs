//! Network transport for the broker connection
//!
//! This module provides the WebSocket seam underneath the STOMP session and
//! the `tokio-tungstenite` connector used in production. The connector is
//! compiled only with the `websocket` feature; without it the application has
//! no transport and the alert channel degrades to a no-op.

use crate::core::{Session, TransportError};
use async_trait::async_trait;

/// Trait for WebSocket connections to enable testing with fake implementations
#[async_trait]
pub trait WebSocketConnection: Send {
    /// Reads the next text message from the WebSocket connection
    ///
    /// # Returns
    /// * `Some(Ok(text))` if a text message was successfully received
    /// * `Some(Err(error))` if there was an error reading the message
    /// * `None` if the connection has been closed
    async fn read_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Sends a text message over the connection
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

/// A `Session` that carries STOMP text directly over a WebSocket.
pub struct RawSession<W: WebSocketConnection> {
    connection: W,
}

impl<W: WebSocketConnection> RawSession<W> {
    pub fn new(connection: W) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl<W: WebSocketConnection> Session for RawSession<W> {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.connection.send_text(text).await
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.connection.read_text().await
    }
}

#[cfg(feature = "websocket")]
pub use self::ws::{TungsteniteConnection, WebSocketConnector};

#[cfg(feature = "websocket")]
mod ws {
    use super::{RawSession, WebSocketConnection};
    use crate::config::TransportKind;
    use crate::core::{Connector, Session, TransportError};
    use crate::sockjs::{self, SockJsSession};
    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::{
        connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
    };
    use tracing::{debug, info};

    /// A `WebSocketConnection` backed by a `tokio-tungstenite` stream.
    pub struct TungsteniteConnection {
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    }

    impl TungsteniteConnection {
        /// Opens a WebSocket connection to `url` (a `ws://` or `wss://` URL).
        pub async fn connect(url: &str) -> Result<Self, TransportError> {
            let (stream, _) = connect_async(url).await.map_err(|e| TransportError::Connect {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })?;
            info!("Connected to {}", url);
            Ok(Self { stream })
        }
    }

    #[async_trait]
    impl WebSocketConnection for TungsteniteConnection {
        async fn read_text(&mut self) -> Option<Result<String, TransportError>> {
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(_)) => {
                        debug!("Received binary message, ignoring");
                    }
                    Ok(Message::Ping(_)) => {
                        debug!("Received ping message");
                    }
                    Ok(Message::Pong(_)) => {
                        debug!("Received pong message");
                    }
                    Ok(Message::Close(_)) => {
                        info!("Received close message from server");
                        return None;
                    }
                    Ok(Message::Frame(_)) => {
                        debug!("Received frame message, ignoring");
                    }
                    Err(e) => return Some(Err(TransportError::WebSocket(e.to_string()))),
                }
            }
        }

        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.stream
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| TransportError::WebSocket(e.to_string()))
        }
    }

    /// Production connector: dials the broker with `tokio-tungstenite`.
    #[derive(Debug, Clone)]
    pub struct WebSocketConnector {
        transport: TransportKind,
    }

    impl WebSocketConnector {
        pub fn new(transport: TransportKind) -> Self {
            Self { transport }
        }
    }

    #[async_trait]
    impl Connector for WebSocketConnector {
        async fn connect(&self, endpoint: &str) -> Result<Box<dyn Session>, TransportError> {
            match self.transport {
                TransportKind::SockJs => {
                    let (server_id, session_id) = sockjs::random_session_path();
                    let url = sockjs::websocket_url(endpoint, &server_id, &session_id)?;
                    debug!(url, "Dialing SockJS websocket transport");
                    let connection = TungsteniteConnection::connect(&url).await?;
                    Ok(Box::new(SockJsSession::open(connection).await?))
                }
                TransportKind::WebSocket => {
                    let url = sockjs::to_websocket_scheme(endpoint)?.to_string();
                    debug!(url, "Dialing raw websocket transport");
                    let connection = TungsteniteConnection::connect(&url).await?;
                    Ok(Box::new(RawSession::new(connection)))
                }
            }
        }
    }
}
