//! Error types for logtap

use std::path::PathBuf;

/// logtap error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container runtime unreachable: {0}")]
    RuntimeUnreachable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Log stream error: {0}")]
    StreamError(String),

    #[error("Failed to write {}: {source}", path.display())]
    SinkFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid container name: {0}")]
    InvalidTargetName(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for logtap
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn unreachable<S: Into<String>>(msg: S) -> Self {
        Error::RuntimeUnreachable(msg.into())
    }

    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Error::StreamError(msg.into())
    }

    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::SinkFailed {
            path: path.into(),
            source,
        }
    }

    /// Whether a watcher should back off and try again after this error.
    ///
    /// Missing containers, an unreachable runtime and dropped streams are all
    /// transient. Permission problems and sink failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ContainerNotFound(_) | Error::RuntimeUnreachable(_) | Error::StreamError(_)
        )
    }

    /// Short machine-friendly name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ContainerNotFound(_) => "not_found",
            Error::RuntimeUnreachable(_) => "unreachable",
            Error::PermissionDenied(_) => "permission_denied",
            Error::StreamError(_) => "stream_error",
            Error::SinkFailed { .. } => "io_failure",
            Error::InvalidTargetName(_) => "invalid_name",
            Error::ConfigError(_) | Error::ConfigNotFound(_) => "config",
            Error::IoError(_) => "io",
            Error::JsonError(_) | Error::TomlError(_) | Error::YamlError(_) => "parse",
        }
    }
}
