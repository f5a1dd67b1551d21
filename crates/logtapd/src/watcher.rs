//! Per-container capture loop
//!
//! A watcher cycles `Connecting -> Streaming -> Backoff -> Connecting` until
//! shutdown or a fatal error, writing every received line to its own file.
//! Shutdown is observed at every await point, so a watcher sleeping in backoff
//! or blocked on a quiet stream stops right away.

use futures::StreamExt;
use logtap_core::{BackoffPolicy, Error, WatchTarget, WatcherState};
use logtap_logs::FileSink;
use logtap_runtime::{LogStream, RuntimeLogSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a watcher stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherExit {
    Shutdown,
    PermissionDenied(String),
    /// The capture file could not be opened or written
    SinkFailed(String),
    /// Any other non-retryable error, or a panicked task
    Fatal(String),
    /// Did not stop within the shutdown timeout
    Aborted,
}

impl WatcherExit {
    pub fn is_failure(&self) -> bool {
        !matches!(self, WatcherExit::Shutdown)
    }
}

impl std::fmt::Display for WatcherExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatcherExit::Shutdown => write!(f, "shutdown"),
            WatcherExit::PermissionDenied(reason) => write!(f, "permission denied: {}", reason),
            WatcherExit::SinkFailed(reason) => write!(f, "sink failed: {}", reason),
            WatcherExit::Fatal(reason) => write!(f, "fatal: {}", reason),
            WatcherExit::Aborted => write!(f, "aborted"),
        }
    }
}

/// Summary returned when a watcher finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherReport {
    pub exit: WatcherExit,
    pub lines_written: u64,
    pub attaches: u64,
    pub backoffs: u64,
}

/// Running totals of a watcher, shared with whoever supervises it so they
/// outlive an aborted task
#[derive(Debug, Default)]
pub struct WatcherCounters {
    lines_written: AtomicU64,
    attaches: AtomicU64,
    backoffs: AtomicU64,
}

impl WatcherCounters {
    /// Report carrying the totals recorded so far
    pub fn report(&self, exit: WatcherExit) -> WatcherReport {
        WatcherReport {
            exit,
            lines_written: self.lines_written.load(Ordering::Relaxed),
            attaches: self.attaches.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
        }
    }
}

/// How one attachment ended
enum Pumped {
    Ended,
    Dropped(Error),
    SinkFailed(Error),
    Shutdown,
}

/// Why a watcher is about to back off
#[derive(Debug)]
enum RetryCause {
    Attach(Error),
    Dropped(Error),
    Ended,
}

impl RetryCause {
    /// Error kind reported on the retry notice
    fn kind(&self) -> &'static str {
        match self {
            RetryCause::Attach(e) | RetryCause::Dropped(e) => e.kind(),
            RetryCause::Ended => "end_of_stream",
        }
    }
}

impl std::fmt::Display for RetryCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryCause::Attach(e) => write!(f, "{}", e),
            RetryCause::Dropped(e) => write!(f, "log stream dropped ({})", e),
            RetryCause::Ended => write!(f, "log stream ended"),
        }
    }
}

/// Captures one container's output into its file
pub struct Watcher {
    target: WatchTarget,
    source: Arc<dyn RuntimeLogSource>,
    sink: FileSink,
    backoff: BackoffPolicy,
    shutdown: CancellationToken,
    state_tx: watch::Sender<WatcherState>,
    counters: Arc<WatcherCounters>,
}

impl Watcher {
    pub fn new(
        target: WatchTarget,
        source: Arc<dyn RuntimeLogSource>,
        sink: FileSink,
        backoff: BackoffPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(WatcherState::Connecting);
        Self {
            target,
            source,
            sink,
            backoff,
            shutdown,
            state_tx,
            counters: Arc::default(),
        }
    }

    /// Receiver for this watcher's state transitions
    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state_tx.subscribe()
    }

    /// Handle on this watcher's running totals
    pub fn counters(&self) -> Arc<WatcherCounters> {
        Arc::clone(&self.counters)
    }

    /// Run until shutdown or a fatal error. The capture file is closed before
    /// the state turns `Stopped`.
    pub async fn run(mut self) -> WatcherReport {
        let exit = self.run_loop().await;

        let Watcher {
            target,
            sink,
            state_tx,
            counters,
            ..
        } = self;

        let path = sink.path().to_path_buf();
        if let Err(e) = sink.close() {
            warn!(
                container = %target.name(),
                path = %path.display(),
                error = %e,
                "Failed to close capture file"
            );
        }
        state_tx.send_replace(WatcherState::Stopped);

        let report = counters.report(exit);
        info!(
            container = %target.name(),
            lines = report.lines_written,
            reason = %report.exit,
            "Stopped log capture for container: {}",
            target.name()
        );

        report
    }

    async fn run_loop(&mut self) -> WatcherExit {
        let mut attempt: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                return WatcherExit::Shutdown;
            }

            self.set_state(WatcherState::Connecting);
            let attached = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return WatcherExit::Shutdown,
                result = self.source.attach(&self.target) => result,
            };
            self.counters.attaches.fetch_add(1, Ordering::Relaxed);

            let cause = match attached {
                Ok(stream) => {
                    attempt = 0;
                    self.set_state(WatcherState::Streaming);
                    info!(container = %self.target.name(), "Attached to log stream");

                    match self.pump(stream).await {
                        Pumped::Ended => RetryCause::Ended,
                        Pumped::Dropped(e) => RetryCause::Dropped(e),
                        Pumped::Shutdown => return WatcherExit::Shutdown,
                        Pumped::SinkFailed(e) => {
                            error!(
                                container = %self.target.name(),
                                error = %e,
                                "Cannot persist captured output, stopping watcher"
                            );
                            return WatcherExit::SinkFailed(e.to_string());
                        }
                    }
                }
                Err(e) if e.is_retryable() => RetryCause::Attach(e),
                Err(Error::PermissionDenied(reason)) => {
                    error!(
                        container = %self.target.name(),
                        error = %reason,
                        "Permission denied attaching to container, not retrying"
                    );
                    return WatcherExit::PermissionDenied(reason);
                }
                Err(e) => {
                    error!(
                        container = %self.target.name(),
                        kind = e.kind(),
                        error = %e,
                        "Unrecoverable error attaching to container"
                    );
                    return WatcherExit::Fatal(e.to_string());
                }
            };

            attempt = attempt.saturating_add(1);
            self.counters.backoffs.fetch_add(1, Ordering::Relaxed);
            let delay = self.backoff.delay(attempt);
            self.set_state(WatcherState::Backoff { attempt });
            warn!(
                container = %self.target.name(),
                kind = cause.kind(),
                attempt,
                delay_secs = delay.as_secs(),
                "{} for '{}', retrying in {:?}",
                cause,
                self.target.name(),
                delay
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return WatcherExit::Shutdown,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Copy lines from one attachment into the sink until it ends
    async fn pump(&mut self, mut stream: LogStream) -> Pumped {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Pumped::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(line)) => {
                    if let Err(e) = self.sink.write(&line) {
                        return Pumped::SinkFailed(e);
                    }
                    self.counters.lines_written.fetch_add(1, Ordering::Relaxed);
                }
                Some(Err(e)) => return Pumped::Dropped(e),
                None => {
                    debug!(container = %self.target.name(), "Log stream reached end of data");
                    return Pumped::Ended;
                }
            }
        }
    }

    fn set_state(&self, state: WatcherState) {
        self.state_tx.send_replace(state);
    }
}
