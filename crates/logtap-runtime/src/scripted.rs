//! Scripted log source for deterministic tests
//!
//! Each container gets a queue of attach outcomes. Every `attach` call pops the
//! next outcome; once the queue is empty the container is reported as missing.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use logtap_core::{Error, LogLine, Result, StreamKind, WatchTarget};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;

use crate::traits::{LogStream, RuntimeLogSource};

/// One step of a scripted stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Line(String),
    /// Connection drops with this message
    Error(String),
    /// Stream stays open without producing anything
    Hang,
}

impl StreamEvent {
    pub fn line(text: impl Into<String>) -> Self {
        StreamEvent::Line(text.into())
    }
}

/// Result of one scripted attach call
#[derive(Debug)]
pub enum AttachOutcome {
    Fail(Error),
    Stream(Vec<StreamEvent>),
    /// Attach never completes
    Hang,
}

impl AttachOutcome {
    /// Stream that yields `lines` and then ends cleanly
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttachOutcome::Stream(lines.into_iter().map(StreamEvent::line).collect())
    }

    pub fn not_found(name: &str) -> Self {
        AttachOutcome::Fail(Error::ContainerNotFound(name.to_string()))
    }

    pub fn unreachable() -> Self {
        AttachOutcome::Fail(Error::unreachable("scripted runtime unavailable"))
    }

    pub fn permission_denied(name: &str) -> Self {
        AttachOutcome::Fail(Error::PermissionDenied(name.to_string()))
    }
}

#[derive(Default)]
struct ScriptState {
    scripts: HashMap<String, VecDeque<AttachOutcome>>,
    attaches: Vec<(String, Instant)>,
    open: HashMap<String, usize>,
    max_open: HashMap<String, usize>,
    emitted: HashMap<String, Vec<String>>,
}

/// Test double replaying scripted attach outcomes per container
#[derive(Clone, Default)]
pub struct ScriptedLogSource {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next attach to `name`
    pub fn push(&self, name: &str, outcome: AttachOutcome) -> &Self {
        self.state
            .lock()
            .scripts
            .entry(name.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Number of attach calls made for `name`
    pub fn attach_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .attaches
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }

    /// When each attach call for `name` happened
    pub fn attach_times(&self, name: &str) -> Vec<Instant> {
        self.state
            .lock()
            .attaches
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Streams for `name` that have been handed out and not yet dropped
    pub fn open_streams(&self, name: &str) -> usize {
        self.state.lock().open.get(name).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously open streams seen for `name`
    pub fn max_concurrent_streams(&self, name: &str) -> usize {
        self.state.lock().max_open.get(name).copied().unwrap_or(0)
    }

    /// Every line the source has actually delivered for `name`, in order
    pub fn emitted(&self, name: &str) -> Vec<String> {
        self.state.lock().emitted.get(name).cloned().unwrap_or_default()
    }

    fn open_stream(&self, name: &str, events: Vec<StreamEvent>) -> LogStream {
        {
            let mut state = self.state.lock();
            let open = state.open.entry(name.to_string()).or_insert(0);
            *open += 1;
            let now_open = *open;
            let max = state.max_open.entry(name.to_string()).or_insert(0);
            *max = (*max).max(now_open);
        }

        let mut items = Vec::new();
        let mut hang = false;
        for event in events {
            match event {
                StreamEvent::Line(text) => items.push(Ok(text)),
                StreamEvent::Error(msg) => {
                    items.push(Err(Error::stream(msg)));
                    break;
                }
                StreamEvent::Hang => {
                    hang = true;
                    break;
                }
            }
        }

        let recorder = Arc::clone(&self.state);
        let target = name.to_string();
        let lines = stream::iter(items).map(move |item| {
            item.map(|text| {
                recorder
                    .lock()
                    .emitted
                    .entry(target.clone())
                    .or_default()
                    .push(text.clone());
                LogLine::now(text, StreamKind::Stdout)
            })
        });

        let inner: BoxStream<'static, Result<LogLine>> = if hang {
            lines.chain(stream::pending()).boxed()
        } else {
            lines.boxed()
        };

        TrackedStream {
            inner,
            _guard: OpenGuard {
                state: Arc::clone(&self.state),
                name: name.to_string(),
            },
        }
        .boxed()
    }
}

#[async_trait]
impl RuntimeLogSource for ScriptedLogSource {
    async fn attach(&self, target: &WatchTarget) -> Result<LogStream> {
        let name = target.name();
        let outcome = {
            let mut state = self.state.lock();
            state.attaches.push((name.to_string(), Instant::now()));
            state.scripts.get_mut(name).and_then(|q| q.pop_front())
        };

        match outcome {
            Some(AttachOutcome::Stream(events)) => Ok(self.open_stream(name, events)),
            Some(AttachOutcome::Fail(e)) => Err(e),
            Some(AttachOutcome::Hang) => futures::future::pending().await,
            None => Err(Error::ContainerNotFound(name.to_string())),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Decrements the open-stream count when a stream is dropped
struct OpenGuard {
    state: Arc<Mutex<ScriptState>>,
    name: String,
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        if let Some(open) = self.state.lock().open.get_mut(&self.name) {
            *open = open.saturating_sub(1);
        }
    }
}

struct TrackedStream {
    inner: BoxStream<'static, Result<LogLine>>,
    _guard: OpenGuard,
}

impl Stream for TrackedStream {
    type Item = Result<LogLine>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn target(name: &str) -> WatchTarget {
        WatchTarget::new(name, Path::new("/tmp/logtap-test")).unwrap()
    }

    #[tokio::test]
    async fn test_scripted_outcomes_in_order() {
        let source = ScriptedLogSource::new();
        source
            .push("b", AttachOutcome::not_found("b"))
            .push("b", AttachOutcome::lines(["z"]));

        let first = source.attach(&target("b")).await;
        assert!(matches!(first, Err(Error::ContainerNotFound(_))));

        let stream = source.attach(&target("b")).await.unwrap();
        let lines: Vec<_> = stream.collect().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_ref().unwrap().payload, "z");
        assert_eq!(source.attach_count("b"), 2);
        assert_eq!(source.emitted("b"), vec!["z".to_string()]);
    }

    #[tokio::test]
    async fn test_exhausted_script_reports_not_found() {
        let source = ScriptedLogSource::new();
        let result = source.attach(&target("ghost")).await;
        assert!(matches!(result, Err(Error::ContainerNotFound(n)) if n == "ghost"));
    }

    #[tokio::test]
    async fn test_stream_error_ends_stream() {
        let source = ScriptedLogSource::new();
        source.push(
            "a",
            AttachOutcome::Stream(vec![
                StreamEvent::line("x"),
                StreamEvent::Error("connection reset".into()),
                StreamEvent::line("never"),
            ]),
        );

        let items: Vec<_> = source.attach(&target("a")).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::StreamError(_))));
    }

    #[tokio::test]
    async fn test_open_stream_tracking() {
        let source = ScriptedLogSource::new();
        source
            .push("a", AttachOutcome::lines(["x"]))
            .push("a", AttachOutcome::lines(["y"]));

        let first = source.attach(&target("a")).await.unwrap();
        assert_eq!(source.open_streams("a"), 1);
        drop(first);
        assert_eq!(source.open_streams("a"), 0);

        let _second = source.attach(&target("a")).await.unwrap();
        assert_eq!(source.open_streams("a"), 1);
        assert_eq!(source.max_concurrent_streams("a"), 1);
    }
}
