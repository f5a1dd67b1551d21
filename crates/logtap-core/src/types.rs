//! Core types for logtap

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::constants::LOG_FILE_EXTENSION;
use crate::error::{Error, Result};

/// Container names as the Docker engine accepts them, optionally with the
/// leading slash the API reports
static CONTAINER_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/?[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("Invalid container name regex")
});

/// Validate a container name before it is used to build a file path
pub fn validate_container_name(name: &str) -> bool {
    CONTAINER_NAME_REGEX.is_match(name)
}

/// File stem used for a container's capture file
pub fn safe_file_stem(name: &str) -> String {
    name.trim_start_matches('/').replace('/', "_")
}

/// A container to capture and the file its output goes to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchTarget {
    name: String,
    output_path: PathBuf,
}

impl WatchTarget {
    /// Build a target for `name`, writing to `<log_dir>/<name>.log`
    pub fn new(name: impl Into<String>, log_dir: &Path) -> Result<Self> {
        let name = name.into();
        if !validate_container_name(&name) {
            return Err(Error::InvalidTargetName(name));
        }

        let output_path = log_dir.join(format!("{}.{}", safe_file_stem(&name), LOG_FILE_EXTENSION));
        Ok(Self { name, output_path })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl std::fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.name, self.output_path.display())
    }
}

/// Which container stream a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Output of a container allocated with a TTY (stdout and stderr merged)
    Console,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
            StreamKind::Console => "console",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of container output as delivered by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub payload: String,
    pub stream: StreamKind,
}

impl LogLine {
    pub fn new(timestamp: DateTime<Utc>, payload: impl Into<String>, stream: StreamKind) -> Self {
        Self {
            timestamp,
            payload: payload.into(),
            stream,
        }
    }

    /// Line stamped with the current time, for sources that carry no timestamp
    pub fn now(payload: impl Into<String>, stream: StreamKind) -> Self {
        Self::new(Utc::now(), payload, stream)
    }

    /// Render the line the way it is stored on disk, newline-terminated.
    ///
    /// With `timestamps` the runtime timestamp is prefixed in the same form
    /// `docker logs --timestamps` prints it.
    pub fn render(&self, timestamps: bool) -> String {
        let payload = self.payload.trim_end_matches(['\n', '\r']);
        if timestamps {
            format!(
                "{} {}\n",
                self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                payload
            )
        } else {
            format!("{}\n", payload)
        }
    }
}

/// Lifecycle state of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Connecting,
    Streaming,
    /// Waiting before the next attach; `attempt` counts consecutive backoffs
    Backoff { attempt: u32 },
    Stopped,
}

impl WatcherState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, WatcherState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherState::Connecting => "connecting",
            WatcherState::Streaming => "streaming",
            WatcherState::Backoff { .. } => "backoff",
            WatcherState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatcherState::Backoff { attempt } => write!(f, "backoff (attempt {})", attempt),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
