//! An in-memory broker transport for driving the alert channel without a
//! socket.
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use wardwatch::core::{Connector, Session, TransportError};

/// A connector whose sessions are fed by the test.
///
/// Every `connect` call hands the test a `FakeBrokerSide` through
/// `accepted`, so the test can play the broker's half of the conversation.
pub struct FakeConnector {
    accepted_tx: mpsc::UnboundedSender<FakeBrokerSide>,
    refuse: Arc<Mutex<bool>>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeBrokerSide>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted_tx,
            refuse: Arc::new(Mutex::new(false)),
        });
        (connector, accepted_rx)
    }

    /// Makes every later connection attempt fail.
    pub fn refuse_connections(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Session>, TransportError> {
        if *self.refuse.lock().unwrap() {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (to_broker_tx, to_broker_rx) = mpsc::unbounded_channel();
        let _ = self.accepted_tx.send(FakeBrokerSide {
            endpoint: endpoint.to_string(),
            to_client: Some(to_client_tx),
            from_client: to_broker_rx,
        });
        Ok(Box::new(FakeSession {
            incoming: to_client_rx,
            outgoing: to_broker_tx,
        }))
    }
}

struct FakeSession {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Session for FakeSession {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::WebSocket("broker side dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.incoming.recv().await.map(Ok)
    }
}

/// The broker's end of one fake session.
pub struct FakeBrokerSide {
    pub endpoint: String,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl FakeBrokerSide {
    /// Reads the next frame the client sent.
    pub async fn recv(&mut self) -> String {
        self.from_client.recv().await.expect("client hung up")
    }

    pub fn send(&self, text: impl Into<String>) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text.into());
        }
    }

    /// Completes the STOMP handshake and returns the `CONNECT` and
    /// `SUBSCRIBE` frames the client sent.
    pub async fn accept(&mut self) -> (String, String) {
        let connect = self.recv().await;
        self.send(super::CONNECTED_FRAME);
        let subscribe = self.recv().await;
        (connect, subscribe)
    }

    /// Ends the session as if the socket closed.
    pub fn close(&mut self) {
        self.to_client.take();
    }
}
