//! logtap runtime - log sources backed by a container runtime

pub mod docker;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
pub mod traits;

pub use docker::DockerLogSource;
#[cfg(any(test, feature = "testing"))]
pub use scripted::{AttachOutcome, ScriptedLogSource, StreamEvent};
pub use traits::{LogStream, RuntimeLogSource};
