//! SockJS WebSocket transport envelope
//!
//! The backend exposes its broker through a SockJS endpoint. Over the raw
//! WebSocket transport SockJS wraps every payload in a one-letter framing:
//! `o` (open), `h` (heartbeat), `a[...]` (batch of messages), `m"..."`
//! (single message) and `c[code,"reason"]` (close). Outgoing payloads are
//! sent as a JSON array of strings.

use crate::core::{Session, TransportError};
use crate::network::WebSocketConnection;
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use tracing::{debug, trace};
use url::Url;

/// A decoded server-to-client SockJS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

/// Parses one server frame.
pub fn parse_frame(text: &str) -> Result<SockJsFrame, TransportError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| TransportError::Protocol("empty frame".to_string()))?;
    let payload = chars.as_str();

    match kind {
        'o' => Ok(SockJsFrame::Open),
        'h' => Ok(SockJsFrame::Heartbeat),
        'a' => {
            let messages: Vec<String> = serde_json::from_str(payload)
                .map_err(|e| TransportError::Protocol(format!("bad message array: {}", e)))?;
            Ok(SockJsFrame::Messages(messages))
        }
        'm' => {
            let message: String = serde_json::from_str(payload)
                .map_err(|e| TransportError::Protocol(format!("bad message: {}", e)))?;
            Ok(SockJsFrame::Messages(vec![message]))
        }
        'c' => {
            let (code, reason): (u16, String) = serde_json::from_str(payload)
                .map_err(|e| TransportError::Protocol(format!("bad close frame: {}", e)))?;
            Ok(SockJsFrame::Close { code, reason })
        }
        other => Err(TransportError::Protocol(format!(
            "unknown frame type '{}'",
            other
        ))),
    }
}

/// Encodes outgoing payloads as a SockJS client frame.
pub fn encode_messages(messages: &[String]) -> String {
    // Serializing a slice of strings cannot fail.
    serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string())
}

/// Builds the raw WebSocket URL for a SockJS endpoint.
///
/// `http://host/ws` becomes `ws://host/ws/{server_id}/{session_id}/websocket`.
pub fn websocket_url(
    endpoint: &str,
    server_id: &str,
    session_id: &str,
) -> Result<String, TransportError> {
    let mut url = to_websocket_scheme(endpoint)?;
    let path = format!(
        "{}/{}/{}/websocket",
        url.path().trim_end_matches('/'),
        server_id,
        session_id
    );
    url.set_path(&path);
    Ok(url.to_string())
}

/// Maps `http`/`https` endpoints to `ws`/`wss`, leaving WebSocket URLs untouched.
pub fn to_websocket_scheme(endpoint: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };
    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };
    // `Url::set_scheme` refuses to switch between special schemes, so rebuild.
    let rest = &url.as_str()[url.scheme().len()..];
    Url::parse(&format!("{}{}", scheme, rest)).map_err(|e| invalid(e.to_string()))
}

/// Generates a random `(server_id, session_id)` pair as SockJS clients do.
pub fn random_session_path() -> (String, String) {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz012345";
    let mut rng = rand::rng();
    let server_id = format!("{:03}", rng.random_range(0..1000));
    let session_id = (0..8)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    (server_id, session_id)
}

/// A `Session` that speaks SockJS framing over a WebSocket connection.
pub struct SockJsSession<W: WebSocketConnection> {
    connection: W,
    pending: VecDeque<String>,
}

impl<W: WebSocketConnection> SockJsSession<W> {
    /// Waits for the server's open frame and returns the ready session.
    pub async fn open(mut connection: W) -> Result<Self, TransportError> {
        loop {
            let text = match connection.read_text().await {
                Some(result) => result?,
                None => {
                    return Err(TransportError::Protocol(
                        "connection closed before open frame".to_string(),
                    ))
                }
            };
            match parse_frame(&text)? {
                SockJsFrame::Open => {
                    debug!("SockJS session opened");
                    return Ok(Self {
                        connection,
                        pending: VecDeque::new(),
                    });
                }
                SockJsFrame::Heartbeat => continue,
                SockJsFrame::Close { code, reason } => {
                    return Err(TransportError::Closed { code, reason })
                }
                SockJsFrame::Messages(_) => {
                    return Err(TransportError::Protocol(
                        "message received before open frame".to_string(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl<W: WebSocketConnection> Session for SockJsSession<W> {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.connection.send_text(encode_messages(&[text])).await
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(Ok(message));
            }
            let text = match self.connection.read_text().await? {
                Ok(text) => text,
                Err(e) => return Some(Err(e)),
            };
            match parse_frame(&text) {
                Ok(SockJsFrame::Messages(messages)) => self.pending.extend(messages),
                Ok(SockJsFrame::Heartbeat) => trace!("SockJS heartbeat"),
                Ok(SockJsFrame::Open) => debug!("Ignoring repeated SockJS open frame"),
                Ok(SockJsFrame::Close { code, reason }) => {
                    return Some(Err(TransportError::Closed { code, reason }))
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
