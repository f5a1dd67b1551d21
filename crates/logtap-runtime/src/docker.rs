//! Docker engine log source

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogOutput, LogsOptions};
use bollard::errors::Error as DockerError;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use logtap_core::{Error, LogLine, Result, StreamKind, WatchTarget};
use std::io;
use tracing::debug;

use crate::traits::{LogStream, RuntimeLogSource};

/// Log source talking to the Docker engine API
#[derive(Clone)]
pub struct DockerLogSource {
    docker: Docker,
}

impl DockerLogSource {
    /// Connect using the local defaults (`DOCKER_HOST` or the unix socket)
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| classify_error("docker", e))?;
        Ok(Self::from_client(docker))
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check the engine answers. Failures use the same classification as attach.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| classify_error("docker", e))
    }
}

#[async_trait]
impl RuntimeLogSource for DockerLogSource {
    async fn attach(&self, target: &WatchTarget) -> Result<LogStream> {
        let name = target.name();

        // The logs endpoint only reports a missing container once polled, so
        // resolve it up front to fail attach with a precise error.
        self.docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| classify_error(name, e))?;

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: true,
            // Only output produced from now on; a reattach must not replay
            // lines already captured.
            tail: "0".to_string(),
            ..Default::default()
        };

        debug!(container = %name, "Opening docker log stream");

        let lines = self
            .docker
            .logs(name, Some(options))
            .map(|frame| match frame {
                Ok(output) => frame_lines(output).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(Error::stream(e.to_string()))],
            })
            .flat_map(stream::iter);

        Ok(lines.boxed())
    }

    fn source_name(&self) -> &'static str {
        "docker"
    }
}

/// Map a Docker client error to the capture error taxonomy
pub fn classify_error(container: &str, err: DockerError) -> Error {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::ContainerNotFound(container.to_string()),
        DockerError::DockerResponseServerError {
            status_code: 401 | 403,
            message,
        } => Error::PermissionDenied(format!("{}: {}", container, message)),
        DockerError::IOError { err } if err.kind() == io::ErrorKind::PermissionDenied => {
            Error::PermissionDenied(format!("{}: {}", container, err))
        }
        other if caused_by_permission_denied(&other) => {
            Error::PermissionDenied(format!("{}: {}", container, other))
        }
        other => Error::unreachable(format!("{}: {}", container, other)),
    }
}

/// Socket permission failures surface nested inside transport errors
fn caused_by_permission_denied(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::PermissionDenied {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Split one multiplexed frame into lines
fn frame_lines(output: LogOutput) -> Vec<LogLine> {
    let (stream, message) = match output {
        LogOutput::StdOut { message } => (StreamKind::Stdout, message),
        LogOutput::StdErr { message } => (StreamKind::Stderr, message),
        LogOutput::Console { message } => (StreamKind::Console, message),
        LogOutput::StdIn { .. } => return Vec::new(),
    };

    String::from_utf8_lossy(&message)
        .split_terminator('\n')
        .map(|raw| parse_line(raw, stream))
        .collect()
}

/// Parse `<rfc3339 timestamp> <payload>` as produced with `timestamps=true`.
///
/// Lines without a parseable timestamp are stamped with the receive time.
pub fn parse_line(raw: &str, stream: StreamKind) -> LogLine {
    let raw = raw.trim_end_matches('\r');
    let (stamp, payload) = raw.split_once(' ').unwrap_or((raw, ""));

    match DateTime::parse_from_rfc3339(stamp) {
        Ok(ts) => LogLine::new(ts.with_timezone(&Utc), payload, stream),
        Err(_) => LogLine::now(raw, stream),
    }
}
