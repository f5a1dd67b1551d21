//! Constants and default values for logtap

use std::path::PathBuf;

/// Default directory captured container logs are written to
pub const DEFAULT_LOG_DIR: &str = "/app/logs";

/// Extension of every captured log file
pub const LOG_FILE_EXTENSION: &str = "log";

/// Default delay between reconnect attempts in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default heartbeat period in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Default cap for the exponential backoff policy in seconds
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default growth factor for the exponential backoff policy
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// How long shutdown waits for watchers before aborting them, in seconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Largest interval or timeout accepted from configuration, in seconds (one year)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Environment variable naming an optional config file
pub const CONFIG_ENV: &str = "LOGTAP_CONFIG";

/// Get the default log directory
pub fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}
