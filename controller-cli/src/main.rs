//! Command-line front end (spec.md §6).
//!
//! Loads the one positional configuration-file argument (or empty
//! defaults if absent), constructs a `LineProtocolParser`, starts the
//! `LifecycleController`, and blocks until an interrupt signal is
//! received. Exit code `0` on clean stop, `1` on fatal startup failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use controller_core::registry::LineProtocolParser;
use controller_core::{ControllerConfig, LifecycleController};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Entity control-plane node.
#[derive(Parser)]
#[command(name = "controller")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Absent or empty uses defaults.
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let raw_config = match &cli.config_path {
        Some(path) if !path.as_os_str().is_empty() => match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                init_fallback_logging();
                error!(path = %path.display(), %err, "failed to read configuration file");
                return ExitCode::FAILURE;
            }
        },
        _ => String::new(),
    };

    let (config, warnings) = match ControllerConfig::parse(&raw_config) {
        Ok(result) => result,
        Err(err) => {
            init_fallback_logging();
            error!(%err, "configuration error during startup");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);
    for warning in &warnings {
        warn!("{}", warning.0);
    }

    let parser = Arc::new(LineProtocolParser::new());
    let controller = match LifecycleController::start(config, parser).await {
        Ok(controller) => controller,
        Err(err) => {
            error!(%err, "fatal startup failure");
            return ExitCode::FAILURE;
        }
    };
    info!("controller is up; waiting for shutdown signal");

    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl-c handler; shutting down immediately");
    } else {
        info!("shutdown signal received");
    }

    const SHUTDOWN_GRACE_SECONDS: u64 = 5;
    if let Err(err) = controller.stop(SHUTDOWN_GRACE_SECONDS).await {
        error!(%err, "error(s) during shutdown");
        return ExitCode::FAILURE;
    }

    info!("controller stopped cleanly");
    ExitCode::SUCCESS
}

/// Wire `tracing` events to stdout per `logging.standard`/`logging.debug`
/// (spec.md §6: `s`=stdout, `n`=none). The debug channel, when enabled,
/// adds a second, `DEBUG`-filtered layer on top of the standard one.
fn init_logging(config: &ControllerConfig) {
    use controller_core::config::LogSink;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if config.logging_standard == LogSink::None && config.logging_debug == LogSink::None {
        return;
    }

    let filter = if config.logging_debug == LogSink::Stdout {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Used only when a configuration error prevents us from ever reaching
/// [`init_logging`]; without this, a startup failure would be silent.
fn init_fallback_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .try_init();
}
