//! The live alert channel
//!
//! `AlertChannel` owns one logical connection to the broker, subscribes to a
//! single topic and fans every received message out to the registered
//! listeners in arrival order. Failed connection attempts are retried after a
//! fixed delay, forever. Whether a drop after a successful connection is also
//! retried is an explicit setting (`retry_after_drop`).
//!
//! The channel has no disconnect operation. Its connection loop ends only
//! when the application's shutdown signal fires or the runtime is torn down.

use crate::config::ChannelConfig;
use crate::core::{Alert, ConnectionState, Connector, Session, TransportError};
use crate::registry::{ListenerRegistry, Subscription};
use crate::stomp::{self, Command, Frame, FrameError};
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Subscription id used for the alert topic, as stomp.js assigns it.
const SUBSCRIPTION_ID: &str = "sub-0";

/// The channel does not send heart-beats and asks for none.
const HEART_BEAT: &str = "0,0";

/// Reasons a connection attempt or an established session ended.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed STOMP frame: {0}")]
    Frame(#[from] FrameError),
    #[error("broker sent ERROR: {0}")]
    Rejected(String),
    #[error("connection closed during STOMP handshake")]
    ClosedDuringHandshake,
}

/// The single live alert channel of the application.
///
/// Cloning is cheap and every clone refers to the same connection and
/// listener registry.
#[derive(Clone)]
pub struct AlertChannel {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChannelConfig,
    connector: Option<Arc<dyn Connector>>,
    registry: ListenerRegistry,
    state_tx: watch::Sender<ConnectionState>,
    running: AtomicBool,
    shutdown_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for AlertChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertChannel")
            .field("endpoint", &self.inner.config.endpoint)
            .field("topic", &self.inner.config.topic)
            .field("state", &*self.inner.state_tx.borrow())
            .field("listeners", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl AlertChannel {
    /// Creates a channel without connecting it.
    ///
    /// # Arguments
    /// * `config` - Endpoint, topic and reconnection settings
    /// * `connector` - The transport, or `None` when no transport is available
    /// * `shutdown_rx` - The application's shutdown signal
    pub fn new(
        config: ChannelConfig,
        connector: Option<Arc<dyn Connector>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                registry: ListenerRegistry::new(),
                state_tx,
                running: AtomicBool::new(false),
                shutdown_rx,
            }),
        }
    }

    /// Starts the connection loop in the background and returns immediately.
    ///
    /// Without a transport, or with the channel disabled, this logs a warning
    /// and does nothing. Calling it while the loop is already running is a
    /// no-op. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let Some(connector) = self.inner.connector.clone() else {
            warn!(
                endpoint = %self.inner.config.endpoint,
                "Live alerts disabled: no transport available."
            );
            return;
        };
        if !self.inner.config.enabled {
            warn!("Live alerts disabled by configuration.");
            return;
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Alert channel connection loop already running.");
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut guard = LoopGuard {
                inner: inner.clone(),
                finished: false,
            };
            let mut shutdown_rx = inner.shutdown_rx.clone();
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Alert channel received shutdown signal.");
                }
                _ = inner.run(connector.as_ref()) => {}
            }
            guard.finished = true;
        });
    }

    /// Registers a listener for every future alert.
    ///
    /// The listener stays registered until the returned handle is dropped;
    /// call [`Subscription::detach`] to keep it for the channel's lifetime.
    pub fn on_alert<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.inner.registry.register(Arc::new(listener))
    }

    /// Delivers `alert` to every listener, synchronously and in registration
    /// order. Listener panics are not caught.
    pub fn notify_listeners(&self, alert: &Alert) {
        self.inner.registry.notify(alert);
    }

    /// Returns a receiver that observes connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Returns true while the connection loop is active.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Returns true if the channel was built with a transport.
    pub fn has_transport(&self) -> bool {
        self.inner.connector.is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }
}

impl Inner {
    async fn run(&self, connector: &dyn Connector) {
        let delay = self.config.reconnect_delay();
        loop {
            self.set_state(ConnectionState::Connecting);
            metrics::counter!("alert_channel_connect_attempts_total").increment(1);
            info!("Attempting to connect to {}", self.config.endpoint);

            match self.establish(connector).await {
                Err(e) => {
                    metrics::counter!("alert_channel_connect_failures_total").increment(1);
                    self.set_state(ConnectionState::Disconnected);
                    warn!(
                        "Network pulse lost: {}. Reconnecting in {} ms",
                        e,
                        delay.as_millis()
                    );
                }
                Ok(session) => {
                    self.set_state(ConnectionState::Connected);
                    info!(
                        "Live network connected. Subscribed to {}",
                        self.config.topic
                    );
                    let result = self.deliver(session).await;
                    self.set_state(ConnectionState::Disconnected);
                    match result {
                        Ok(()) => info!("Alert connection closed by the server."),
                        Err(e) => warn!("Alert connection dropped: {}", e),
                    }
                    if !self.config.retry_after_drop {
                        info!("Reconnect after drop is disabled; alert channel stopped.");
                        return;
                    }
                    info!("Reconnecting in {} ms", delay.as_millis());
                }
            }

            tokio::time::sleep(delay).await;
        }
    }

    /// Opens a transport session, performs the STOMP handshake and subscribes.
    async fn establish(&self, connector: &dyn Connector) -> Result<StompSession, ChannelError> {
        let transport = connector.connect(&self.config.endpoint).await?;
        let mut session = StompSession::new(transport);
        session
            .send_frame(&Frame::connect(&self.config.accept_version, HEART_BEAT))
            .await?;

        loop {
            let frame = match session.next_frame().await {
                Some(result) => result?,
                None => return Err(ChannelError::ClosedDuringHandshake),
            };
            match frame.command {
                Command::Connected => {
                    debug!(
                        version = frame.get_header("version").unwrap_or("1.0"),
                        "STOMP session established"
                    );
                    break;
                }
                Command::Error => return Err(ChannelError::Rejected(error_message(&frame))),
                other => debug!("Ignoring {} frame during handshake", other),
            }
        }

        session
            .send_frame(&Frame::subscribe(SUBSCRIPTION_ID, &self.config.topic))
            .await?;
        Ok(session)
    }

    /// Delivers messages until the session closes or fails.
    async fn deliver(&self, mut session: StompSession) -> Result<(), ChannelError> {
        while let Some(result) = session.next_frame().await {
            let frame = match result {
                Ok(frame) => frame,
                Err(ChannelError::Frame(e)) => {
                    warn!("Failed to parse STOMP frame: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match frame.command {
                Command::Message => {
                    if let Some(id) = frame.get_header("subscription") {
                        if id != SUBSCRIPTION_ID {
                            debug!(subscription = id, "Ignoring message for unknown subscription");
                            continue;
                        }
                    }
                    metrics::counter!("alerts_received_total").increment(1);
                    let alert = Alert::new(frame.body);
                    debug!(bytes = alert.len(), "Received alert");
                    self.registry.notify(&alert);
                }
                Command::Error => return Err(ChannelError::Rejected(error_message(&frame))),
                Command::Receipt => debug!("Received receipt"),
                other => debug!("Ignoring unexpected {} frame", other),
            }
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Alert channel state changed");
            let connected = if state == ConnectionState::Connected { 1.0 } else { 0.0 };
            metrics::gauge!("alert_channel_connected").set(connected);
        }
    }
}

/// Resets the channel when its loop task ends, including by panic or abort.
struct LoopGuard {
    inner: Arc<Inner>,
    finished: bool,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if !self.finished {
            error!("Alert channel loop aborted (listener panic or runtime shutdown).");
        }
        self.inner.set_state(ConnectionState::Disconnected);
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            // The sender is gone without signalling; only runtime teardown ends the loop.
            std::future::pending::<()>().await;
        }
    }
}

fn error_message(frame: &Frame) -> String {
    match frame.get_header("message") {
        Some(message) => message.to_string(),
        None => frame.body.trim_end().to_string(),
    }
}

/// A transport session read frame by frame.
///
/// A malformed frame is reported only after the frames that preceded it in
/// the same transport message.
struct StompSession {
    transport: Box<dyn Session>,
    pending: VecDeque<Result<Frame, FrameError>>,
}

impl StompSession {
    fn new(transport: Box<dyn Session>) -> Self {
        Self {
            transport,
            pending: VecDeque::new(),
        }
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        self.transport.send(frame.encode()).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, ChannelError>> {
        loop {
            if let Some(next) = self.pending.pop_front() {
                return Some(next.map_err(ChannelError::from));
            }
            let text = match self.transport.recv().await? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            let (frames, error) = stomp::parse_frames_partial(&text);
            self.pending.extend(frames.into_iter().map(Ok));
            self.pending.extend(error.map(Err));
        }
    }
}
