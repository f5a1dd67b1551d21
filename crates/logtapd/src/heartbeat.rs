//! Periodic liveness record
//!
//! Runs on its own timer and only reads watcher state, so a stuck or failing
//! watcher can never delay a beat.

use chrono::{DateTime, Utc};
use logtap_core::WatcherState;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::supervisor::deadline_after;

/// One heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRecord {
    pub beat: u64,
    pub at: DateTime<Utc>,
    /// Watchers that have not stopped
    pub active: Vec<String>,
    pub streaming: usize,
    pub backoff: usize,
    pub stopped: usize,
}

pub struct Heartbeat {
    period: Duration,
    watchers: Vec<(String, watch::Receiver<WatcherState>)>,
    broadcast_tx: Option<mpsc::Sender<HeartbeatRecord>>,
}

impl Heartbeat {
    pub fn new(period: Duration, watchers: Vec<(String, watch::Receiver<WatcherState>)>) -> Self {
        Self {
            period,
            watchers,
            broadcast_tx: None,
        }
    }

    /// Also publish each record to `tx`. Records are dropped when the
    /// receiver falls behind.
    pub fn with_broadcast(mut self, tx: mpsc::Sender<HeartbeatRecord>) -> Self {
        self.broadcast_tx = Some(tx);
        self
    }

    /// Snapshot of the watchers right now
    pub fn record(&self, beat: u64) -> HeartbeatRecord {
        let mut record = HeartbeatRecord {
            beat,
            at: Utc::now(),
            active: Vec::new(),
            streaming: 0,
            backoff: 0,
            stopped: 0,
        };

        for (name, state) in &self.watchers {
            let state = *state.borrow();
            match state {
                WatcherState::Streaming => record.streaming += 1,
                WatcherState::Backoff { .. } => record.backoff += 1,
                WatcherState::Stopped => record.stopped += 1,
                WatcherState::Connecting => {}
            }
            if !state.is_stopped() {
                record.active.push(name.clone());
            }
        }

        record
    }

    /// Beat every period until shutdown. The first beat comes one full period
    /// after start. Returns the number of beats emitted.
    pub async fn run(self, shutdown: CancellationToken) -> u64 {
        let mut ticker = time::interval_at(deadline_after(self.period), self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut beats = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    beats += 1;
                    let record = self.record(beats);
                    info!(
                        beat = record.beat,
                        streaming = record.streaming,
                        backoff = record.backoff,
                        stopped = record.stopped,
                        "Heartbeat - active capture watchers: {:?}",
                        record.active
                    );

                    if let Some(tx) = &self.broadcast_tx {
                        // Non-blocking send
                        let _ = tx.try_send(record);
                    }
                }
            }
        }

        debug!(beats, "Heartbeat stopped");
        beats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_beats_on_fixed_period() {
        let (_tx, rx) = watch::channel(WatcherState::Streaming);
        let (record_tx, mut record_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();

        let heartbeat = Heartbeat::new(Duration::from_secs(60), vec![("web".to_string(), rx)])
            .with_broadcast(record_tx);
        let task = tokio::spawn(heartbeat.run(shutdown.clone()));

        let start = Instant::now();
        let first = record_rx.recv().await.unwrap();
        assert_eq!(first.beat, 1);
        assert_eq!(start.elapsed(), Duration::from_secs(60));

        let second = record_rx.recv().await.unwrap();
        assert_eq!(second.beat, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(120));

        shutdown.cancel();
        assert_eq!(task.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_beat_before_first_period() {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Heartbeat::new(Duration::from_secs(60), vec![]).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(59)).await;
        shutdown.cancel();
        assert_eq!(task.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_period_keeps_running() {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            Heartbeat::new(Duration::from_secs(u64::MAX), vec![]).run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!task.is_finished());

        shutdown.cancel();
        assert_eq!(task.await.unwrap(), 0);
    }

    #[test]
    fn test_record_counts_states() {
        let (_a, a) = watch::channel(WatcherState::Streaming);
        let (_b, b) = watch::channel(WatcherState::Backoff { attempt: 4 });
        let (_c, c) = watch::channel(WatcherState::Stopped);
        let (_d, d) = watch::channel(WatcherState::Connecting);

        let heartbeat = Heartbeat::new(
            Duration::from_secs(60),
            vec![
                ("a".to_string(), a),
                ("b".to_string(), b),
                ("c".to_string(), c),
                ("d".to_string(), d),
            ],
        );

        let record = heartbeat.record(7);
        assert_eq!(record.beat, 7);
        assert_eq!(record.active, vec!["a", "b", "d"]);
        assert_eq!(record.streaming, 1);
        assert_eq!(record.backoff, 1);
        assert_eq!(record.stopped, 1);
    }

    #[test]
    fn test_record_reads_state_after_sender_dropped() {
        let (tx, rx) = watch::channel(WatcherState::Streaming);
        tx.send_replace(WatcherState::Stopped);
        drop(tx);

        let heartbeat = Heartbeat::new(Duration::from_secs(1), vec![("gone".to_string(), rx)]);
        let record = heartbeat.record(1);
        assert!(record.active.is_empty());
        assert_eq!(record.stopped, 1);
    }
}
