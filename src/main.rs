//! WardWatch - live alert listener for the hospital intelligence backend

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wardwatch::{
    api::{ApiClient, Patient},
    app::App,
    cli::{Cli, Command},
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().with_env_filter("error").init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG takes precedence over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.clone().unwrap_or(Command::Watch) {
        Command::Watch => watch_alerts(config).await,
        Command::Patients(args) => {
            let client = api_client(&config).await?;
            let patients = match (args.doctor, args.nurse) {
                (Some(doctor), _) => client.patients_for_doctor(&doctor).await?,
                (None, Some(nurse)) => client.patients_for_nurse(&nurse).await?,
                (None, None) => anyhow::bail!("one of --doctor or --nurse is required"),
            };
            print_patients(&patients);
            Ok(())
        }
        Command::Meds { patient_id } => {
            let client = api_client(&config).await?;
            for med in client.medications_for_patient(patient_id).await? {
                println!(
                    "{:>6}  {:<24} {:?}  {}",
                    med.id,
                    med.medicine_name,
                    med.status,
                    med.timestamp.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}

async fn watch_alerts(config: Config) -> Result<()> {
    info!("WardWatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Live Alerts: {}", if config.channel.enabled { "Enabled" } else { "Disabled" });
    info!("Endpoint: {}", config.channel.endpoint);
    info!("Transport: {}", config.channel.transport);
    info!("Topic: {}", config.channel.topic);
    info!("Reconnect Delay: {}ms", config.channel.reconnect_delay_ms);
    info!("Reconnect After Drop: {}", config.channel.retry_after_drop);
    info!("Output Format: {}", config.output.format);
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;
    if !app.channel().has_transport() {
        warn!("Built without the `websocket` feature; no alerts will be received.");
    }

    let app_handle = tokio::spawn(app.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown signal received. Shutting down gracefully...");
    // The app may already have stopped; a closed channel is fine.
    let _ = shutdown_tx.send(true);

    app_handle.await??;
    info!("Exiting.");
    Ok(())
}

async fn api_client(config: &Config) -> Result<ApiClient> {
    let mut client = ApiClient::new(&config.api)?;
    if client.token().is_none() {
        if let (Some(username), Some(password)) = (&config.api.username, &config.api.password) {
            let role = client.login(username, password).await?;
            info!(username, role, "Logged in");
        }
    }
    Ok(client)
}

fn print_patients(patients: &[Patient]) {
    for patient in patients {
        println!(
            "{:>6}  {:<24} {:>3}  {:<8} {:<10}",
            patient.id.map(|id| id.to_string()).unwrap_or_default(),
            patient.name,
            patient.age,
            patient.room.as_deref().unwrap_or("-"),
            patient.condition_or_default(),
        );
    }
}
