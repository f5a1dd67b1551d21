//! Append-only log file sink

use logtap_core::{Error, LogLine, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How lines are rendered and persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    /// Prefix each line with its runtime timestamp
    pub timestamps: bool,
    /// Call `sync_data` after every line
    pub fsync: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            timestamps: true,
            fsync: false,
        }
    }
}

/// Writer owning one capture file.
///
/// The file is opened in append mode and never truncated, so content captured
/// by a previous run stays in front of anything written now. Writes go straight
/// to the file handle without an in-process buffer.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
    options: SinkOptions,
    bytes_written: u64,
    lines_written: u64,
}

impl FileSink {
    /// Open (or create) the file at `path`, creating its parent directory
    pub fn open(path: impl Into<PathBuf>, options: SinkOptions) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::sink(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::sink(&path, e))?;

        let initial_size = file.metadata().map_err(|e| Error::sink(&path, e))?.len();
        debug!(path = %path.display(), initial_size, "Opened capture file");

        Ok(Self {
            path,
            file,
            options,
            bytes_written: 0,
            lines_written: 0,
        })
    }

    /// Append one line
    pub fn write(&mut self, line: &LogLine) -> Result<()> {
        let rendered = line.render(self.options.timestamps);
        self.write_raw(rendered.as_bytes())
    }

    /// Append raw bytes exactly as given
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .map_err(|e| Error::sink(&self.path, e))?;

        if self.options.fsync {
            self.file
                .sync_data()
                .map_err(|e| Error::sink(&self.path, e))?;
        }

        self.bytes_written += data.len() as u64;
        self.lines_written += 1;
        Ok(())
    }

    /// Flush and sync the file, then release the handle.
    ///
    /// Dropping the sink also releases the handle; `close` additionally
    /// reports whether the final sync succeeded.
    pub fn close(mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::sink(&self.path, e))?;
        self.file.sync_all().map_err(|e| Error::sink(&self.path, e))?;
        debug!(
            path = %self.path.display(),
            lines = self.lines_written,
            bytes = self.bytes_written,
            "Closed capture file"
        );
        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use logtap_core::StreamKind;
    use tempfile::TempDir;

    fn plain() -> SinkOptions {
        SinkOptions {
            timestamps: false,
            fsync: false,
        }
    }

    #[test]
    fn test_open_creates_parent_and_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("web.log");

        let sink = FileSink::open(path.clone(), SinkOptions::default()).unwrap();
        assert!(path.exists());
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn test_write_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");

        let mut sink = FileSink::open(path.clone(), plain()).unwrap();
        for payload in ["x", "y", "z"] {
            sink.write(&LogLine::now(payload, StreamKind::Stdout)).unwrap();
        }
        sink.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x\ny\nz\n");
    }

    #[test]
    fn test_write_with_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let mut sink = FileSink::open(path.clone(), SinkOptions::default()).unwrap();
        sink.write(&LogLine::new(ts, "started\n", StreamKind::Stderr)).unwrap();
        drop(sink);

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "2024-01-02T03:04:05.000000000Z started\n"
        );
    }

    #[test]
    fn test_reopen_appends_after_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "previous run\n").unwrap();

        let mut sink = FileSink::open(path.clone(), plain()).unwrap();
        sink.write(&LogLine::now("first", StreamKind::Stdout)).unwrap();
        sink.close().unwrap();

        let mut sink = FileSink::open(path.clone(), plain()).unwrap();
        sink.write(&LogLine::now("second", StreamKind::Stdout)).unwrap();
        sink.close().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "previous run\nfirst\nsecond\n"
        );
    }

    #[test]
    fn test_fsync_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let options = SinkOptions {
            timestamps: false,
            fsync: true,
        };

        let mut sink = FileSink::open(path.clone(), options).unwrap();
        sink.write(&LogLine::now("durable", StreamKind::Console)).unwrap();

        // Visible to other readers before close
        assert_eq!(fs::read_to_string(&path).unwrap(), "durable\n");
    }

    #[test]
    fn test_open_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let result = FileSink::open(blocker.join("a.log"), plain());
        match result {
            Err(Error::SinkFailed { path, .. }) => assert_eq!(path, blocker),
            other => panic!("expected SinkFailed, got {:?}", other),
        }
    }
}
