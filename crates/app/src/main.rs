//! CalBridge - periodic reconciler between an issue tracker and a calendar
//!
//! Main entry point for the daemon: load configuration, wire the
//! application context, run one immediate synchronization, then hand over
//! to the interval scheduler until the process is signalled.

mod context;

use std::process::ExitCode;

use calbridge_domain::{CalBridgeError, Result};
use context::AppContext;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before the subscriber so RUST_LOG from the file is honoured.
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded environment file"),
        Err(err) => warn!(error = %err, "no environment file loaded"),
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "calbridge terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = calbridge_infra::config::load()?;
    let ctx = AppContext::new(config).await?;

    // Initial synchronization before the periodic loop starts. A failing
    // first run is logged but does not bring the daemon down.
    if let Err(err) = ctx.engine().sync().await {
        error!(error = %err, "initial synchronization failed");
    }

    ctx.start().await?;
    info!("calbridge running; send SIGINT to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| CalBridgeError::Internal(format!("failed to listen for signals: {err}")))?;

    info!("shutdown signal received");
    ctx.shutdown().await
}
