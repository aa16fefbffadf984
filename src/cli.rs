//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `wardwatch.toml` file and environment variables.

use clap::{Args, Parser, Subcommand};
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Live alert listener and API client for the hospital intelligence backend.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Broker endpoint URL (e.g. http://localhost:8080/ws).
    #[arg(long, value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// Topic to subscribe to.
    #[arg(long, value_name = "DESTINATION", global = true)]
    pub topic: Option<String>,

    /// Delay between reconnection attempts in milliseconds.
    #[arg(long, value_name = "MS", global = true)]
    pub reconnect_delay_ms: Option<u64>,

    /// Base URL of the REST API.
    #[arg(long, value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Print alerts as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands. Without one, `watch` is assumed.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Stream live alerts to stdout until interrupted.
    Watch,
    /// List patients assigned to a doctor or nurse.
    Patients(PatientsArgs),
    /// List medications for a patient.
    Meds {
        /// The patient id.
        patient_id: i64,
    },
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct PatientsArgs {
    /// Doctor username.
    #[arg(long)]
    pub doctor: Option<String>,
    /// Nurse username.
    #[arg(long)]
    pub nurse: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut channel = Dict::new();
        if let Some(endpoint) = &self.endpoint {
            channel.insert("endpoint".into(), Value::from(endpoint.clone()));
        }
        if let Some(topic) = &self.topic {
            channel.insert("topic".into(), Value::from(topic.clone()));
        }
        if let Some(delay) = self.reconnect_delay_ms {
            channel.insert("reconnect_delay_ms".into(), Value::from(delay));
        }

        let mut api = Dict::new();
        if let Some(url) = &self.api_url {
            api.insert("base_url".into(), Value::from(url.clone()));
        }

        let mut output = Dict::new();
        // `--json` can only switch JSON on; its absence leaves the configured format alone.
        if self.json {
            output.insert("format".into(), Value::from("Json"));
        }

        let mut dict = Dict::new();
        for (key, section) in [("channel", channel), ("api", api), ("output", output)] {
            if !section.is_empty() {
                dict.insert(key.into(), Value::Dict(Tag::Default, section));
            }
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
