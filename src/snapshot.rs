//! Point-in-time copies of the ranked buffer and the sinks they persist into.

use std::{
    fs::File,
    io::{self, Write as _},
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::words::Words;

/// Destination for a snapshot payload.
///
/// A sink receives the whole payload in one `write_all`, then is either `close`d to make it
/// durable or `cancel`led to discard whatever was written.
pub trait SnapshotSink {
    fn write_all(&mut self, payload: &[u8]) -> io::Result<()>;

    fn cancel(&mut self);

    fn close(&mut self) -> io::Result<()>;
}

/// An immutable copy of the buffer taken under the tracker lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordsSnapshot {
    applied_index: u64,
    words: Words,
}

impl WordsSnapshot {
    pub(crate) fn new(applied_index: u64, words: Words) -> Self {
        Self {
            applied_index,
            words,
        }
    }

    pub fn applied_index(&self) -> u64 {
        self.applied_index
    }

    pub fn words(&self) -> &Words {
        &self.words
    }

    /// Write the encoded buffer to `sink`. A failed write cancels the sink before the error is
    /// returned; a successful one closes it.
    pub fn persist(&self, sink: &mut dyn SnapshotSink) -> Result<(), SnapshotError> {
        if let Err(err) = sink.write_all(&self.words.encode()) {
            sink.cancel();
            return Err(SnapshotError::Write(err));
        }
        sink.close().map_err(SnapshotError::Close)
    }
}

#[derive(Debug)]
pub enum SnapshotError {
    Write(io::Error),
    Close(io::Error),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write(e) => write!(f, "snapshot sink write: {e}"),
            Self::Close(e) => write!(f, "snapshot sink close: {e}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Write(e) | Self::Close(e) => Some(e),
        }
    }
}

impl From<SnapshotError> for io::Error {
    fn from(value: SnapshotError) -> Self {
        match value {
            SnapshotError::Write(e) | SnapshotError::Close(e) => e,
        }
    }
}

/// Collects the payload in memory; used for the snapshot data handed to the raft runtime.
#[derive(Debug, Default)]
pub struct MemorySink {
    buf: Vec<u8>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The payload, once the sink has been closed.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.closed.then_some(self.buf)
    }
}

impl SnapshotSink for MemorySink {
    fn write_all(&mut self, payload: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    fn cancel(&mut self) {
        self.buf.clear();
        self.closed = false;
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Writes into `<path>.tmp` and renames over `path` on close. A failed close removes the
/// temporary file, so `path` only ever holds a complete payload.
#[derive(Debug)]
pub struct FileSnapshotSink {
    path: PathBuf,
    tmp: PathBuf,
    file: Option<File>,
}

impl FileSnapshotSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::with_header(path, &[])
    }

    /// Like [`FileSnapshotSink::create`], with `header` written ahead of the payload so both are
    /// published by the same rename.
    pub fn with_header(path: &Path, header: &[u8]) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        if let Err(err) = file.write_all(header) {
            drop(file);
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(Self {
            path: path.to_path_buf(),
            tmp,
            file: Some(file),
        })
    }
}

impl SnapshotSink for FileSnapshotSink {
    fn write_all(&mut self, payload: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("snapshot sink already finished"))?;
        file.write_all(payload)
    }

    fn cancel(&mut self) {
        self.file = None;
        if let Err(err) = std::fs::remove_file(&self.tmp)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.tmp.display(), %err, "remove cancelled snapshot");
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| io::Error::other("snapshot sink already finished"))?;
        let synced = file.sync_all();
        drop(file);
        let res = synced.and_then(|()| std::fs::rename(&self.tmp, &self.path));
        if res.is_err() {
            self.cancel();
        }
        res
    }
}
