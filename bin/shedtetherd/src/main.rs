//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the ShedTether daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use shedtether_common::config::AppConfig;
use shedtether_common::logging::init_tracing;
use shedtether_common::version::VersionInfo;
use shedtether_core::{DeliveryOutcome, IterationOutcome, ShedController};
use shedtether_metrics::{
    new_registry, spawn_http_server, ControllerMetrics, DaemonMetrics, MetricsServer,
};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

const SERVICE_NAME: &str = "shedtetherd";
const DEFAULT_CONFIG_PATH: &str = "configs/shedtether.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "ShedTether load-shedding controller",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the control loop until interrupted")]
    Run,
    #[command(about = "Run a single iteration and print the outcome as JSON")]
    Once,
    #[command(about = "Validate and print the effective configuration")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.report(SERVICE_NAME));
        return Ok(());
    }

    let loaded = AppConfig::load_with_source(cli.config.as_deref(), &[DEFAULT_CONFIG_PATH])?;
    let config = loaded.config;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            match &loaded.source {
                Some(path) => println!("# source: {}", path.display()),
                None => println!("# source: built-in defaults"),
            }
            print!("{}", config.to_toml()?);
        }
        Commands::Once => {
            start_tracing(&config, loaded.source.as_deref(), &version)?;
            let controller = ShedController::from_config(&config)?;
            let outcome = controller.run_once().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&OutcomeView::from(&outcome))?
            );
        }
        Commands::Run => {
            start_tracing(&config, loaded.source.as_deref(), &version)?;
            run_daemon(config, &version).await?
        }
    }

    Ok(())
}

fn start_tracing(config: &AppConfig, source: Option<&Path>, version: &VersionInfo) -> Result<()> {
    init_tracing(SERVICE_NAME, &config.logging)?;
    match source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => warn!("no configuration file found; running with built-in defaults"),
    }
    info!(version = %version, "starting {}", SERVICE_NAME);
    Ok(())
}

async fn run_daemon(config: AppConfig, version: &VersionInfo) -> Result<()> {
    let mut controller = ShedController::from_config(&config)?;

    let mut metrics_server: Option<MetricsServer> = None;
    if config.metrics.enabled {
        let registry = new_registry();
        let daemon_metrics = DaemonMetrics::new(registry.clone())?;
        daemon_metrics.inc_start();
        daemon_metrics.set_build_info(version.semver, version.git_sha);
        controller = controller.with_metrics(ControllerMetrics::new(registry.clone())?);
        let server = spawn_http_server(registry, config.metrics.listen)
            .context("failed to start metrics exporter")?;
        info!(address = %server.addr(), "metrics exporter enabled");
        metrics_server = Some(server);
    } else {
        info!("metrics exporter disabled by configuration");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut loop_task = tokio::spawn(async move { controller.run(shutdown_rx).await });

    let finished = tokio::select! {
        result = &mut loop_task => Some(result),
        signal = signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            None
        }
    };
    let iterations = match finished {
        Some(result) => result.context("control loop task failed")?,
        None => {
            info!("ctrl-c received; shutting down");
            let _ = shutdown_tx.send(());
            loop_task.await.context("control loop task failed")?
        }
    };
    info!(iterations, "control loop stopped");

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

/// Printable form of an [`IterationOutcome`] for the `once` subcommand.
#[derive(Debug, Serialize)]
struct OutcomeView {
    current_amps: f64,
    relay_status: String,
    relay_triggered: bool,
    http_status: Option<u16>,
    accepted: bool,
    error: Option<String>,
}

impl From<&IterationOutcome> for OutcomeView {
    fn from(outcome: &IterationOutcome) -> Self {
        let (http_status, accepted, error) = match &outcome.delivery {
            DeliveryOutcome::Delivered(delivery) => {
                (Some(delivery.status), delivery.accepted, None)
            }
            DeliveryOutcome::Failed(reason) => (None, false, Some(reason.clone())),
        };
        Self {
            current_amps: outcome.current_amps,
            relay_status: outcome.relay_status.to_string(),
            relay_triggered: outcome.relay_triggered,
            http_status,
            accepted,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shedtether_core::{Delivery, RelayStatus};
    use std::ffi::OsString;

    fn outcome(delivery: DeliveryOutcome) -> IterationOutcome {
        IterationOutcome {
            current_amps: 15.2,
            relay_status: RelayStatus::SheddingLoad,
            relay_triggered: true,
            delivery,
        }
    }

    #[test]
    fn delivered_outcome_carries_http_status() {
        let view = OutcomeView::from(&outcome(DeliveryOutcome::Delivered(Delivery {
            status: 200,
            accepted: true,
        })));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["relay_status"], "SHEDDING_LOAD");
        assert_eq!(json["http_status"], 200);
        assert_eq!(json["accepted"], true);
        assert!(json["error"].is_null());
    }

    #[test]
    fn failed_outcome_carries_error_without_status() {
        let view = OutcomeView::from(&outcome(DeliveryOutcome::Failed(
            "connection refused".into(),
        )));
        assert_eq!(view.http_status, None);
        assert!(!view.accepted);
        assert_eq!(view.error.as_deref(), Some("connection refused"));
        assert!(view.relay_triggered);
    }

    #[test]
    fn cli_defaults_to_run_without_config() {
        let cli = Cli::try_parse_from(["shedtetherd"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.version);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_config_and_subcommands() {
        let cli = Cli::try_parse_from(["shedtetherd", "--config", "bench.toml", "check-config"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("bench.toml")));
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));

        let cli = Cli::try_parse_from(["shedtetherd", "once"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Once)));

        let cli = Cli::try_parse_from(["shedtetherd", "-V"]).unwrap();
        assert!(cli.version);
    }

    #[test]
    fn missing_config_flag_target_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let typo = dir.path().join("typo.toml");
        let cli = Cli::try_parse_from([
            OsString::from("shedtetherd"),
            OsString::from("--config"),
            typo.clone().into_os_string(),
            OsString::from("check-config"),
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(typo.as_path()));
        assert!(AppConfig::load_with_source(cli.config.as_deref(), &[DEFAULT_CONFIG_PATH]).is_err());
    }
}
