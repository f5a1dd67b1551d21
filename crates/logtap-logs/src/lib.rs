//! logtap logs - append-only capture files

mod writer;

pub use writer::{FileSink, SinkOptions};
