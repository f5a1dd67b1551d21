//! Capture supervisor - one watcher per container plus the heartbeat

use logtap_core::{BackoffPolicy, Settings, WatchTarget, WatcherState};
use logtap_logs::{FileSink, SinkOptions};
use logtap_runtime::RuntimeLogSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::heartbeat::{Heartbeat, HeartbeatRecord};
use crate::watcher::{Watcher, WatcherCounters, WatcherExit, WatcherReport};

/// `Instant::now() + after`, or a point roughly 30 years out when that
/// would overflow
pub(crate) fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

/// Knobs shared by every watcher the supervisor starts
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub backoff: BackoffPolicy,
    pub heartbeat_interval: Duration,
    pub shutdown_timeout: Duration,
    pub sink: SinkOptions,
}

impl SupervisorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            backoff: settings.backoff_policy(),
            heartbeat_interval: settings.heartbeat_interval(),
            shutdown_timeout: settings.shutdown_timeout(),
            sink: SinkOptions {
                timestamps: settings.timestamps,
                fsync: settings.fsync,
            },
        }
    }
}

/// Supervised watcher state
struct WatcherHandle {
    target: WatchTarget,
    state: watch::Receiver<WatcherState>,
    task: Option<JoinHandle<WatcherReport>>,
    counters: Arc<WatcherCounters>,
    /// Set when the watcher could not be started
    startup_exit: Option<WatcherExit>,
}

/// What happened to every target, returned after shutdown
#[derive(Debug)]
pub struct SupervisorReport {
    pub watchers: Vec<(WatchTarget, WatcherReport)>,
    pub heartbeats: u64,
}

impl SupervisorReport {
    pub fn report_for(&self, name: &str) -> Option<&WatcherReport> {
        self.watchers
            .iter()
            .find(|(target, _)| target.name() == name)
            .map(|(_, report)| report)
    }
}

/// Capture supervisor
pub struct Supervisor {
    targets: Vec<WatchTarget>,
    source: Arc<dyn RuntimeLogSource>,
    options: SupervisorOptions,
    shutdown: CancellationToken,
    watchers: Vec<WatcherHandle>,
    heartbeat: Option<JoinHandle<u64>>,
    heartbeat_tx: Option<mpsc::Sender<HeartbeatRecord>>,
}

impl Supervisor {
    /// Create a new supervisor
    pub fn new(
        targets: Vec<WatchTarget>,
        source: Arc<dyn RuntimeLogSource>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            targets,
            source,
            options,
            shutdown: CancellationToken::new(),
            watchers: Vec::new(),
            heartbeat: None,
            heartbeat_tx: None,
        }
    }

    /// Publish heartbeat records to `tx` as well as logging them
    pub fn with_heartbeat_broadcast(mut self, tx: mpsc::Sender<HeartbeatRecord>) -> Self {
        self.heartbeat_tx = Some(tx);
        self
    }

    /// Spawn one watcher per target and the heartbeat. Calling it again is a no-op.
    pub fn start(&mut self) {
        if !self.watchers.is_empty() || self.heartbeat.is_some() {
            return;
        }

        info!(
            "Starting {} watcher(s) using the {} log source",
            self.targets.len(),
            self.source.source_name()
        );

        for target in &self.targets {
            info!(container = %target.name(), "Starting log capture: {}", target);

            let handle = match FileSink::open(target.output_path(), self.options.sink) {
                Ok(sink) => {
                    let watcher = Watcher::new(
                        target.clone(),
                        Arc::clone(&self.source),
                        sink,
                        self.options.backoff,
                        self.shutdown.child_token(),
                    );
                    let state = watcher.subscribe();
                    let counters = watcher.counters();
                    WatcherHandle {
                        target: target.clone(),
                        state,
                        task: Some(tokio::spawn(watcher.run())),
                        counters,
                        startup_exit: None,
                    }
                }
                Err(e) => {
                    error!(
                        container = %target.name(),
                        error = %e,
                        "Cannot open capture file, watcher not started"
                    );
                    let (_, state) = watch::channel(WatcherState::Stopped);
                    WatcherHandle {
                        target: target.clone(),
                        state,
                        task: None,
                        counters: Arc::default(),
                        startup_exit: Some(WatcherExit::SinkFailed(e.to_string())),
                    }
                }
            };
            self.watchers.push(handle);
        }

        let mut heartbeat = Heartbeat::new(
            self.options.heartbeat_interval,
            self.watchers
                .iter()
                .map(|w| (w.target.name().to_string(), w.state.clone()))
                .collect(),
        );
        if let Some(tx) = self.heartbeat_tx.clone() {
            heartbeat = heartbeat.with_broadcast(tx);
        }
        self.heartbeat = Some(tokio::spawn(heartbeat.run(self.shutdown.child_token())));
    }

    /// Current state of every started watcher, in target order
    pub fn statuses(&self) -> Vec<(String, WatcherState)> {
        self.watchers
            .iter()
            .map(|w| (w.target.name().to_string(), *w.state.borrow()))
            .collect()
    }

    /// Start, run until `signal` completes, then shut down
    pub async fn run_until<F>(mut self, signal: F) -> SupervisorReport
    where
        F: Future<Output = ()>,
    {
        self.start();
        tokio::select! {
            _ = signal => {}
            _ = self.shutdown.cancelled() => {}
        }
        self.shutdown().await
    }

    /// Signal every task to stop and wait for them.
    ///
    /// Tasks still running after the shutdown timeout are aborted.
    pub async fn shutdown(self) -> SupervisorReport {
        info!("Stopping {} watcher(s)", self.watchers.len());
        self.shutdown.cancel();

        let deadline = deadline_after(self.options.shutdown_timeout);
        let mut watchers = Vec::with_capacity(self.watchers.len());

        for handle in self.watchers {
            let report = match (handle.task, handle.startup_exit) {
                (Some(mut task), _) => match tokio::time::timeout_at(deadline, &mut task).await {
                    Ok(Ok(report)) => report,
                    Ok(Err(e)) => {
                        error!(container = %handle.target.name(), error = %e, "Watcher task failed");
                        handle.counters.report(WatcherExit::Fatal(e.to_string()))
                    }
                    Err(_) => {
                        warn!(
                            container = %handle.target.name(),
                            "Watcher did not stop within {:?}, aborting",
                            self.options.shutdown_timeout
                        );
                        task.abort();
                        handle.counters.report(WatcherExit::Aborted)
                    }
                },
                (None, exit) => handle.counters.report(
                    exit.unwrap_or_else(|| WatcherExit::Fatal("watcher never started".to_string())),
                ),
            };
            watchers.push((handle.target, report));
        }

        let heartbeats = match self.heartbeat {
            Some(mut task) => match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(beats)) => beats,
                Ok(Err(e)) => {
                    error!(error = %e, "Heartbeat task failed");
                    0
                }
                Err(_) => {
                    task.abort();
                    0
                }
            },
            None => 0,
        };

        SupervisorReport {
            watchers,
            heartbeats,
        }
    }
}
