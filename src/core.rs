//! Core domain types and transport traits for WardWatch
//!
//! This module defines the alert payload, the connection state machine, and
//! the trait contracts the alert channel uses to reach the broker. The
//! transport traits are the seam that lets tests drive the channel with fake
//! sessions instead of a real socket.

use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

/// A single alert pushed by the backend on the alert topic.
///
/// The payload is an opaque string such as `Patient 123 risk: HIGH -> [SpO2 low]`.
/// It is never parsed or trimmed; listeners receive exactly the bytes the
/// broker delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Alert(String);

impl Alert {
    /// Wraps a raw payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// Returns the raw payload.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the alert and returns the raw payload.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for Alert {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Alert {
    fn from(payload: String) -> Self {
        Self(payload)
    }
}

impl From<&str> for Alert {
    fn from(payload: &str) -> Self {
        Self(payload.to_string())
    }
}

/// Lifecycle of the channel's single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Errors raised by a transport while dialing or during a session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("sockjs protocol error: {0}")]
    Protocol(String),
    #[error("session closed by server ({code}): {reason}")]
    Closed { code: u16, reason: String },
}

// =============================================================================
// Transport Traits
// =============================================================================

/// Dials the broker endpoint and produces a text session.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new session to `endpoint`.
    ///
    /// # Returns
    /// * `Ok(session)` once the transport is ready to carry STOMP frames
    /// * `Err` if the endpoint is invalid or the transport could not be opened
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Session>, TransportError>;
}

/// A bidirectional session carrying STOMP frame text.
///
/// Each item yielded by `recv` is one transport message, which may hold one
/// or more STOMP frames (or a bare heart-beat).
#[async_trait]
pub trait Session: Send {
    /// Sends one transport message.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Reads the next transport message.
    ///
    /// # Returns
    /// * `Some(Ok(text))` for each message
    /// * `Some(Err(error))` if the session failed or the server closed it with a reason
    /// * `None` once the session has been closed
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}
