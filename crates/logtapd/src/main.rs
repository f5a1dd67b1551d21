//! logtap daemon - captures container logs into append-only files

use anyhow::Result;
use clap::Parser;
use logtap_runtime::DockerLogSource;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod heartbeat;
mod signals;
mod supervisor;
mod watcher;

use cli::Cli;
use signals::ShutdownSignals;
use supervisor::{Supervisor, SupervisorOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = cli.settings()?;
    settings.validate()?;
    for name in settings.duplicate_names() {
        warn!(container = %name, "Container listed more than once, capturing it once");
    }
    let targets = settings.targets()?;

    info!("Log capture service starting");
    info!("Watching containers: {:?}", settings.container_names());
    info!("Log output directory: {}", settings.log_dir.display());
    info!(
        "Reconnect policy: {} from {}s",
        settings.backoff_policy().name(),
        settings.poll_interval_secs
    );

    // Per-target failures are reported by each watcher
    if let Err(e) = std::fs::create_dir_all(&settings.log_dir) {
        warn!(error = %e, "Cannot create log output directory {}", settings.log_dir.display());
    }

    let mut signals = ShutdownSignals::register()?;

    let source = DockerLogSource::connect()?;
    if let Err(e) = source.ping().await {
        warn!(error = %e, "Container runtime not reachable yet, watchers will keep retrying");
    }

    let supervisor = Supervisor::new(
        targets,
        Arc::new(source),
        SupervisorOptions::from_settings(&settings),
    );

    let report = supervisor
        .run_until(async {
            let name = signals.recv().await;
            info!("Received {}, stopping log capture...", name);
        })
        .await;

    for (target, watcher) in &report.watchers {
        if watcher.exit.is_failure() {
            error!(
                container = %target.name(),
                lines = watcher.lines_written,
                attaches = watcher.attaches,
                "Watcher ended: {}",
                watcher.exit
            );
        } else {
            info!(
                container = %target.name(),
                lines = watcher.lines_written,
                attaches = watcher.attaches,
                backoffs = watcher.backoffs,
                "Watcher ended: {}",
                watcher.exit
            );
        }
    }

    info!(heartbeats = report.heartbeats, "Log capture service stopped.");
    Ok(())
}
