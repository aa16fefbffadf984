//! Test helpers for running the full application instance.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use wardwatch::{
    app::{AlertHandler, App},
    channel::AlertChannel,
    config::Config,
    core::{Alert, Connector},
};

/// A running application instance.
pub struct TestApp {
    pub channel: AlertChannel,
    pub alerts: Arc<Mutex<Vec<Alert>>>,
    shutdown_tx: watch::Sender<bool>,
    app_handle: Option<JoinHandle<Result<()>>>,
}

impl TestApp {
    pub fn received(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    /// Waits until at least `count` alerts have been recorded.
    pub async fn wait_for_alerts(&self, count: usize, within: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("expected {} alerts, got {:?}", count, received);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Signals shutdown and waits for the app to stop.
    /// Fails if the application does not shut down within the given timeout.
    pub async fn shutdown(mut self, timeout_duration: Duration) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        match self.app_handle.take() {
            Some(handle) => match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            },
            None => Ok(()),
        }
    }
}

/// A builder for `TestApp` instances.
pub struct TestAppBuilder {
    pub config: Config,
    connector: Option<Option<Arc<dyn Connector>>>,
    handlers: Vec<AlertHandler>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.channel.endpoint = "http://127.0.0.1:9/ws".to_string();
        config.channel.reconnect_delay_ms = 50;
        Self {
            config,
            connector: None,
            handlers: Vec::new(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(Some(connector));
        self
    }

    pub fn without_connector(mut self) -> Self {
        self.connector = Some(None);
        self
    }

    pub fn with_handler(mut self, handler: AlertHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_config<F: FnOnce(&mut Config)>(mut self, f: F) -> Self {
        f(&mut self.config);
        self
    }

    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (recorder, alerts) = super::recording_handler();

        let mut handlers = vec![recorder];
        handlers.extend(self.handlers);

        let mut builder = App::builder(self.config).output_override(handlers);
        builder = match self.connector {
            Some(Some(connector)) => builder.connector_override(connector),
            Some(None) => builder.no_connector(),
            None => builder,
        };

        let app = builder.build(shutdown_rx).await?;
        let channel = app.channel().clone();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            channel,
            alerts,
            shutdown_tx,
            app_handle: Some(app_handle),
        })
    }
}
