//! CLI argument definitions

use clap::{ArgAction, Parser};
use logtap_core::config::BackoffKind;
use logtap_core::{Result, Settings};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logtapd")]
#[command(version, about = "Capture container logs into append-only files")]
pub struct Cli {
    /// Config file (.toml, .yaml, .yml or .json)
    #[arg(short, long, env = "LOGTAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Containers to capture, comma-separated
    #[arg(long, env = "CONTAINER_NAMES", value_delimiter = ',')]
    pub containers: Option<Vec<String>>,

    /// Directory the capture files are written to
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Seconds between reconnect attempts
    #[arg(long, env = "POLL_INTERVAL", value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Seconds between heartbeat records
    #[arg(long, env = "HEARTBEAT_INTERVAL", value_name = "SECS")]
    pub heartbeat_interval: Option<u64>,

    /// Reconnect delay strategy
    #[arg(long, env = "BACKOFF", value_name = "fixed|exponential")]
    pub backoff: Option<BackoffKind>,

    /// Upper bound for exponential backoff
    #[arg(long, env = "BACKOFF_MAX", value_name = "SECS")]
    pub backoff_max: Option<u64>,

    /// Seconds to wait for watchers on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT", value_name = "SECS")]
    pub shutdown_timeout: Option<u64>,

    /// Store lines without the runtime timestamp prefix
    #[arg(long)]
    pub no_timestamps: bool,

    /// Sync every line to disk
    #[arg(long)]
    pub fsync: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Settings from the config file (if any) with flags and env applied on top
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(containers) = &self.containers {
            settings.containers = containers.clone();
        }
        if let Some(dir) = &self.log_dir {
            settings.log_dir = dir.clone();
        }
        if let Some(secs) = self.poll_interval {
            settings.poll_interval_secs = secs;
        }
        if let Some(secs) = self.heartbeat_interval {
            settings.heartbeat_interval_secs = secs;
        }
        if let Some(kind) = self.backoff {
            settings.backoff.kind = kind;
        }
        if let Some(secs) = self.backoff_max {
            settings.backoff.max_secs = Some(secs);
        }
        if let Some(secs) = self.shutdown_timeout {
            settings.shutdown_timeout_secs = secs;
        }
        if self.no_timestamps {
            settings.timestamps = false;
        }
        if self.fsync {
            settings.fsync = true;
        }

        Ok(settings)
    }

    /// Default tracing filter for the chosen verbosity
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        format!(
            "logtapd={level},logtap_runtime={level},logtap_logs={level}",
            level = level
        )
    }
}
