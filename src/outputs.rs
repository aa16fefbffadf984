//! Alert output
//!
//! `StdoutOutput` is the listener the `watch` command registers on the alert
//! channel. It prints every alert as it arrives, either as a timestamped text
//! line or as one JSON object per line.

use crate::config::OutputFormat;
use crate::core::Alert;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

/// The JSON shape of a printed alert.
#[derive(Debug, Serialize)]
struct AlertRecord<'a> {
    received_at: String,
    alert: &'a str,
}

/// Writes alerts to stdout in the configured format.
#[derive(Debug, Clone, Copy)]
pub struct StdoutOutput {
    format: OutputFormat,
}

impl StdoutOutput {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Renders one alert, stamped with the time it was received.
    pub fn render(&self, alert: &Alert, received_at: DateTime<Utc>) -> String {
        let timestamp = received_at.to_rfc3339();
        match self.format {
            OutputFormat::PlainText => format!("[{}] {}", timestamp, alert),
            OutputFormat::Json => {
                let record = AlertRecord {
                    received_at: timestamp,
                    alert: alert.as_str(),
                };
                // Serializing two strings cannot fail.
                serde_json::to_string(&record).unwrap_or_default()
            }
        }
    }

    /// Prints `alert` to stdout. Write failures are logged, not propagated,
    /// since a listener has no caller to report to.
    pub fn write(&self, alert: &Alert) {
        let line = self.render(alert, Utc::now());
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", line) {
            error!("Failed to write alert to stdout: {}", e);
        }
    }

    /// Returns this output as a channel listener.
    pub fn into_listener(self) -> impl Fn(&Alert) + Send + Sync + 'static {
        move |alert: &Alert| self.write(alert)
    }
}
