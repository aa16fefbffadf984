//! The main application logic, decoupled from the entry point.

use crate::{
    channel::AlertChannel,
    config::Config,
    core::{Alert, ConnectionState, Connector},
    outputs::StdoutOutput,
    task_manager::TaskManager,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// A listener installed by the application on startup.
pub type AlertHandler = Arc<dyn Fn(&Alert) + Send + Sync>;

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    channel: AlertChannel,
}

impl App {
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The application's live alert channel. Further listeners may be
    /// registered on it while the app runs.
    pub fn channel(&self) -> &AlertChannel {
        &self.channel
    }

    /// Waits for the shutdown signal and then waits for all tasks to finish.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        // An Err means the sender is gone, which is a shutdown as well.
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;
        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Tests use the `*_override` methods to swap in a fake transport or to
/// capture alerts instead of printing them.
pub struct AppBuilder {
    config: Config,
    connector_override: Option<Option<Arc<dyn Connector>>>,
    output_override: Option<Vec<AlertHandler>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connector_override: None,
            output_override: None,
        }
    }

    /// Uses `connector` instead of the default WebSocket transport.
    pub fn connector_override(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector_override = Some(Some(connector));
        self
    }

    /// Builds the app as if no transport were available.
    pub fn no_connector(mut self) -> Self {
        self.connector_override = Some(None);
        self
    }

    /// Replaces the stdout output with the given listeners.
    pub fn output_override(mut self, handlers: Vec<AlertHandler>) -> Self {
        self.output_override = Some(handlers);
        self
    }

    /// Builds the application, registers its listeners and starts the alert
    /// channel.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx.clone());

        let connector = match self.connector_override {
            Some(connector) => connector,
            None => default_connector(&config),
        };
        debug!(
            endpoint = %config.channel.endpoint,
            topic = %config.channel.topic,
            transport = %config.channel.transport,
            has_transport = connector.is_some(),
            "Initializing alert channel"
        );
        let channel = AlertChannel::new(config.channel.clone(), connector, shutdown_rx);

        match self.output_override {
            Some(handlers) => {
                for handler in handlers {
                    channel.on_alert(move |alert| handler(alert)).detach();
                }
            }
            None => {
                debug!(format = %config.output.format, "Initializing StdoutOutput");
                let output = StdoutOutput::new(config.output.format);
                channel.on_alert(output.into_listener()).detach();
            }
        }

        task_manager.spawn(
            "ChannelMonitor",
            monitor_connection(channel.state(), task_manager.get_shutdown_rx()),
        );

        channel.connect();

        Ok(App {
            task_manager,
            channel,
        })
    }
}

#[cfg(feature = "websocket")]
fn default_connector(config: &Config) -> Option<Arc<dyn Connector>> {
    Some(Arc::new(crate::network::WebSocketConnector::new(
        config.channel.transport,
    )))
}

#[cfg(not(feature = "websocket"))]
fn default_connector(_config: &Config) -> Option<Arc<dyn Connector>> {
    None
}

/// Logs connection state transitions until shutdown.
async fn monitor_connection(
    mut state_rx: watch::Receiver<ConnectionState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                debug!("Channel monitor received shutdown signal.");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                info!("Live alert channel is {}", state);
            }
        }
    }
}
