//! Log source trait and common types

use async_trait::async_trait;
use futures::stream::BoxStream;
use logtap_core::{LogLine, Result, WatchTarget};

/// Lines from one attachment, in the order the runtime emitted them.
///
/// An `Err` item means the connection dropped; the stream ending means the
/// container stopped producing output.
pub type LogStream = BoxStream<'static, Result<LogLine>>;

/// Something that can attach to a container's log output
#[async_trait]
pub trait RuntimeLogSource: Send + Sync {
    /// Attach to the target's log stream.
    ///
    /// Only output produced after the attachment is delivered; earlier output
    /// is never replayed. Fails with `ContainerNotFound`, `RuntimeUnreachable`
    /// or `PermissionDenied`.
    async fn attach(&self, target: &WatchTarget) -> Result<LogStream>;

    /// Get the source name (for display)
    fn source_name(&self) -> &'static str;
}
