//! Configuration for WardWatch
//!
//! Settings are grouped per component (`channel`, `api`, `output`). `figment`
//! merges them from built-in defaults, an optional TOML file, `WARDWATCH_`
//! environment variables and finally command-line flags.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default SockJS endpoint of the hospital backend.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/ws";
/// Default alert topic.
pub const DEFAULT_TOPIC: &str = "/topic/alerts";
/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// All application settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Configuration for the live alert channel.
    pub channel: ChannelConfig,
    /// Configuration for the REST client.
    pub api: ApiConfig,
    /// Configuration for alert output.
    pub output: OutputConfig,
}

/// Which WebSocket flavour the broker endpoint speaks.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// SockJS framing over its raw WebSocket transport.
    SockJs,
    /// STOMP directly over a plain WebSocket.
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::SockJs => write!(f, "SockJS"),
            TransportKind::WebSocket => write!(f, "WebSocket"),
        }
    }
}

/// Configuration for the live alert channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Whether the live channel should connect at all.
    pub enabled: bool,
    /// The broker endpoint URL.
    pub endpoint: String,
    /// The topic to subscribe to.
    pub topic: String,
    /// The transport flavour of the endpoint.
    pub transport: TransportKind,
    /// Fixed delay before every reconnection attempt, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Whether a drop after a successful connection schedules a reconnect.
    /// When false, only failed connection attempts are retried.
    pub retry_after_drop: bool,
    /// The `accept-version` header sent in the STOMP `CONNECT` frame.
    pub accept_version: String,
}

impl ChannelConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            transport: TransportKind::SockJs,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            retry_after_drop: true,
            accept_version: "1.1,1.2".to_string(),
        }
    }
}

/// Configuration for the REST client.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiConfig {
    /// Base URL all API endpoints are appended to.
    pub base_url: String,
    /// Bearer token sent with every request, if already known.
    pub token: Option<String>,
    /// Credentials used to log in before issuing requests.
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            token: None,
            username: None,
            password: None,
        }
    }
}

/// The format for stdout output.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    PlainText,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "JSON"),
            OutputFormat::PlainText => write!(f, "Plain Text"),
        }
    }
}

/// Configuration for alert output.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct OutputConfig {
    /// The format to use for stdout output.
    pub format: OutputFormat,
}

impl Config {
    /// Loads the application configuration by layering defaults, the config
    /// file named on the command line, environment variables and CLI flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = &cli.config_file {
            if !path.exists() {
                anyhow::bail!("Config file not found at {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: Config = figment
            // Allow overriding with environment variables, e.g., WARDWATCH_CHANNEL__TOPIC=/topic/vitals
            .merge(Env::prefixed("WARDWATCH_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            channel: ChannelConfig::default(),
            api: ApiConfig::default(),
            output: OutputConfig::default(),
        }
    }
}
