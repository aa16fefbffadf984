//! A local WebSocket broker that speaks just enough SockJS and STOMP for the
//! alert channel's end-to-end tests.
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    },
    WebSocketStream,
};

/// Accepts WebSocket connections on an ephemeral port.
pub struct MockBroker {
    addr: SocketAddr,
    sockjs: bool,
    accepted_rx: mpsc::UnboundedReceiver<BrokerConnection>,
    accept_task: JoinHandle<()>,
}

impl MockBroker {
    /// Starts a broker that wraps frames in SockJS framing when `sockjs` is
    /// true, or sends bare STOMP text otherwise.
    pub async fn start(sockjs: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let accepted_tx = accepted_tx.clone();
                tokio::spawn(async move {
                    if let Some(connection) = BrokerConnection::accept(stream, sockjs).await {
                        let _ = accepted_tx.send(connection);
                    }
                });
            }
        });

        Self {
            addr,
            sockjs,
            accepted_rx,
            accept_task,
        }
    }

    /// The `http://` endpoint the channel should be configured with.
    pub fn endpoint(&self) -> String {
        format!("http://{}/ws", self.addr)
    }

    pub fn is_sockjs(&self) -> bool {
        self.sockjs
    }

    /// Waits for the next client connection.
    pub async fn next_connection(&mut self) -> BrokerConnection {
        self.accepted_rx.recv().await.expect("broker stopped")
    }

    /// Stops accepting new connections.
    pub fn stop(&self) {
        self.accept_task.abort();
    }
}

/// One accepted client connection.
pub struct BrokerConnection {
    ws: WebSocketStream<TcpStream>,
    sockjs: bool,
    /// The request path the client connected to.
    pub path: String,
}

impl BrokerConnection {
    async fn accept(stream: TcpStream, sockjs: bool) -> Option<Self> {
        let path = Arc::new(Mutex::new(String::new()));
        let seen = path.clone();
        let ws = accept_hdr_async(stream, move |request: &Request, response: Response| {
            *seen.lock().unwrap() = request.uri().path().to_string();
            Ok::<_, ErrorResponse>(response)
        })
        .await
        .ok()?;
        let path = path.lock().unwrap().clone();
        let mut connection = Self { ws, sockjs, path };
        if sockjs {
            connection.send_raw("o").await;
        }
        Some(connection)
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Sends one STOMP frame to the client.
    pub async fn send_frame(&mut self, frame: &str) {
        if self.sockjs {
            let batch = serde_json::to_string(&[frame]).unwrap();
            self.send_raw(&format!("a{}", batch)).await;
        } else {
            self.send_raw(frame).await;
        }
    }

    /// Sends a SockJS heartbeat frame. Ignored for raw connections.
    pub async fn send_heartbeat(&mut self) {
        if self.sockjs {
            self.send_raw("h").await;
        }
    }

    /// Reads the next STOMP frame the client sent.
    pub async fn recv_frame(&mut self) -> String {
        loop {
            match self.ws.next().await.expect("client hung up").unwrap() {
                Message::Text(text) => {
                    if !self.sockjs {
                        return text.as_str().to_string();
                    }
                    let mut batch: Vec<String> = serde_json::from_str(text.as_str()).unwrap();
                    assert_eq!(batch.len(), 1, "expected one frame per SockJS message");
                    return batch.remove(0);
                }
                Message::Close(_) => panic!("client closed the connection"),
                _ => continue,
            }
        }
    }

    /// Completes the STOMP handshake and returns the `CONNECT` and
    /// `SUBSCRIBE` frames the client sent.
    pub async fn accept_stomp(&mut self) -> (String, String) {
        let connect = self.recv_frame().await;
        self.send_frame(super::CONNECTED_FRAME).await;
        let subscribe = self.recv_frame().await;
        (connect, subscribe)
    }

    /// Publishes an alert on the default subscription.
    pub async fn push_alert(&mut self, body: &str) {
        self.send_frame(&super::message_frame(body)).await;
    }

    /// Closes the connection the way the broker would on shutdown.
    pub async fn close(mut self) {
        if self.sockjs {
            self.send_raw(r#"c[3000,"Go away!"]"#).await;
        }
        let _ = self.ws.close(None).await;
    }
}
