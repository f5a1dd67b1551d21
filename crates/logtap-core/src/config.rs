//! Configuration for logtap
//!
//! Settings can come from a config file in any of these formats, with
//! command-line flags and environment variables layered on top by the binary:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::{validate_container_name, WatchTarget};

fn default_log_dir() -> PathBuf {
    crate::constants::default_log_dir()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Backoff strategy names accepted in config files and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

impl std::str::FromStr for BackoffKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" | "exp" => Ok(BackoffKind::Exponential),
            other => Err(Error::config(format!(
                "Unknown backoff strategy '{}'. Expected fixed or exponential",
                other
            ))),
        }
    }
}

/// Backoff section of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub kind: BackoffKind,
    /// Upper bound for exponential backoff in seconds
    pub max_secs: Option<u64>,
    /// Growth factor for exponential backoff
    pub factor: Option<f64>,
}

/// Runtime settings for the capture service
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Containers to capture, by name
    #[serde(default)]
    pub containers: Vec<String>,
    /// Directory the per-container log files are written to
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Delay between reconnect attempts in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Heartbeat period in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Prefix each stored line with the runtime timestamp
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Sync file data to disk after every line
    #[serde(default)]
    pub fsync: bool,
    /// Seconds to wait for watchers on shutdown before aborting them
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            log_dir: default_log_dir(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            backoff: BackoffConfig::default(),
            timestamps: true,
            fsync: false,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse settings content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let settings = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(settings)
    }

    /// Container names trimmed, with empty entries and duplicates removed.
    /// Order of first appearance is kept.
    pub fn container_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.containers
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.to_string()))
            .map(|name| name.to_string())
            .collect()
    }

    /// Names that appear more than once in the configured list
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for name in self.containers.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !seen.insert(name) && !dups.iter().any(|d| d == name) {
                dups.push(name.to_string());
            }
        }
        dups
    }

    /// Check the settings are usable before anything is started
    pub fn validate(&self) -> Result<()> {
        let names = self.container_names();
        if names.is_empty() {
            return Err(Error::config(
                "No containers configured. Set CONTAINER_NAMES or pass --containers",
            ));
        }

        if let Some(bad) = names.iter().find(|n| !validate_container_name(n)) {
            return Err(Error::InvalidTargetName(bad.clone()));
        }

        if self.poll_interval_secs == 0 {
            return Err(Error::config("Poll interval must be greater than zero"));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(Error::config("Heartbeat interval must be greater than zero"));
        }

        for (label, secs) in [
            ("Poll interval", self.poll_interval_secs),
            ("Heartbeat interval", self.heartbeat_interval_secs),
            ("Shutdown timeout", self.shutdown_timeout_secs),
        ] {
            if secs > MAX_INTERVAL_SECS {
                return Err(Error::config(format!(
                    "{} of {}s exceeds the maximum of {}s",
                    label, secs, MAX_INTERVAL_SECS
                )));
            }
        }

        if let Some(max) = self.backoff.max_secs {
            if max < self.poll_interval_secs || max > MAX_INTERVAL_SECS {
                return Err(Error::config(format!(
                    "Backoff max must be between the poll interval ({}s) and {}s, got {}s",
                    self.poll_interval_secs, MAX_INTERVAL_SECS, max
                )));
            }
        }

        if let Some(factor) = self.backoff.factor {
            if !factor.is_finite() || factor < 1.0 {
                return Err(Error::config(format!(
                    "Backoff factor must be at least 1.0, got {}",
                    factor
                )));
            }
        }

        Ok(())
    }

    /// Build one target per configured container
    pub fn targets(&self) -> Result<Vec<WatchTarget>> {
        self.container_names()
            .into_iter()
            .map(|name| WatchTarget::new(name, &self.log_dir))
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Backoff policy derived from the poll interval and the backoff section
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let first = self.poll_interval();
        match self.backoff.kind {
            BackoffKind::Fixed => BackoffPolicy::fixed(first),
            BackoffKind::Exponential => BackoffPolicy::exponential(
                first,
                Duration::from_secs(self.backoff.max_secs.unwrap_or(DEFAULT_BACKOFF_MAX_SECS)),
                self.backoff.factor.unwrap_or(DEFAULT_BACKOFF_FACTOR),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.log_dir, PathBuf::from("/app/logs"));
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(60));
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(10));
        assert!(settings.timestamps);
        assert!(!settings.fsync);
        assert_eq!(settings.backoff_policy(), BackoffPolicy::fixed(Duration::from_secs(5)));
    }

    #[test]
    fn test_container_names_normalized() {
        let settings = Settings {
            containers: [" flask_open", " ", "java_springv1", "flask_open", ""]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        };
        assert_eq!(
            settings.container_names(),
            vec!["flask_open".to_string(), "java_springv1".to_string()]
        );
        assert_eq!(settings.duplicate_names(), vec!["flask_open".to_string()]);
    }

    #[test]
    fn test_validate_requires_containers() {
        let settings = Settings {
            containers: vec![" ".to_string(), String::new()],
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_name() {
        let settings = Settings {
            containers: vec!["ok".to_string(), "../escape".to_string()],
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::InvalidTargetName(n)) if n == "../escape"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let settings = Settings {
            containers: vec!["web".to_string()],
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    fn exponential(max_secs: u64) -> Settings {
        Settings {
            containers: vec!["web".to_string()],
            backoff: BackoffConfig {
                kind: BackoffKind::Exponential,
                max_secs: Some(max_secs),
                factor: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_rejects_zero_backoff_max() {
        assert!(matches!(exponential(0).validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_validate_backoff_max_not_below_poll_interval() {
        assert!(exponential(4).validate().is_err());

        let settings = exponential(5);
        settings.validate().unwrap();
        assert_eq!(settings.backoff_policy().delay(1), Duration::from_secs(5));
        assert_eq!(settings.backoff_policy().delay(3), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_oversized_intervals() {
        let base = Settings {
            containers: vec!["web".to_string()],
            ..Default::default()
        };

        let heartbeat = Settings {
            heartbeat_interval_secs: u64::MAX,
            ..base.clone()
        };
        assert!(matches!(heartbeat.validate(), Err(Error::ConfigError(_))));

        let shutdown = Settings {
            shutdown_timeout_secs: MAX_INTERVAL_SECS + 1,
            ..base.clone()
        };
        assert!(shutdown.validate().is_err());

        assert!(exponential(u64::MAX).validate().is_err());

        let at_limit = Settings {
            heartbeat_interval_secs: MAX_INTERVAL_SECS,
            ..base
        };
        at_limit.validate().unwrap();
    }

    #[test]
    fn test_targets_use_log_dir() {
        let settings = Settings {
            containers: vec!["a".to_string(), "b".to_string()],
            log_dir: PathBuf::from("/tmp/capture"),
            ..Default::default()
        };
        let targets = settings.targets().unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].output_path(), Path::new("/tmp/capture/b.log"));
    }

    #[test]
    fn test_load_toml() {
        let config_content = r#"
containers = ["flask_open", "java_springv1"]
log_dir = "/var/log/capture"
poll_interval_secs = 2
timestamps = false

[backoff]
kind = "exponential"
max_secs = 30
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.containers.len(), 2);
        assert_eq!(settings.log_dir, PathBuf::from("/var/log/capture"));
        assert!(!settings.timestamps);
        assert_eq!(settings.heartbeat_interval_secs, 60);
        assert_eq!(
            settings.backoff_policy(),
            BackoffPolicy::exponential(Duration::from_secs(2), Duration::from_secs(30), 2.0)
        );
    }

    #[test]
    fn test_load_yaml() {
        let config_content = r#"
containers:
  - web
  - worker
heartbeat_interval_secs: 15
fsync: true
"#;
        let mut file = NamedTempFile::with_suffix(".yml").unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.container_names(), vec!["web", "worker"]);
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(15));
        assert!(settings.fsync);
    }

    #[test]
    fn test_load_json() {
        let config_content = r#"{"containers": ["db"], "shutdown_timeout_secs": 3}"#;
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.containers, vec!["db"]);
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Settings::load(Path::new("/nonexistent/logtap.toml"));
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_unknown_extension() {
        let file = NamedTempFile::with_suffix(".ini").unwrap();
        assert!(matches!(Settings::load(file.path()), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_backoff_kind_from_str() {
        assert_eq!("Fixed".parse::<BackoffKind>().unwrap(), BackoffKind::Fixed);
        assert_eq!("exponential".parse::<BackoffKind>().unwrap(), BackoffKind::Exponential);
        assert!("linear".parse::<BackoffKind>().is_err());
    }
}
