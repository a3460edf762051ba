//! JSON-lines event store.
//!
//! One event per line, appended with `O_APPEND` semantics and flushed to
//! disk before `append` returns. A write that fails part way is cut back to
//! the previous file length so no torn line is left behind.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use provenance_core::LogEvent;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::traits::EventStore;

/// Append-only JSON-lines file of log events.
pub struct JsonlEventStore {
    path: PathBuf,
    /// Writer handle, shared with blocking append tasks.
    file: Arc<Mutex<File>>,
}

impl JsonlEventStore {
    /// Open (or create) the log file at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "opened event log file");
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for JsonlEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlEventStore")
            .field("path", &self.path)
            .finish()
    }
}

/// The file operations an append needs.
trait LogFile: Write {
    fn len(&self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write `line` plus a newline, or leave the file as it was.
fn append_line<F: LogFile>(file: &mut F, line: &str) -> io::Result<()> {
    let before = file.len()?;
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');

    let written = file.write_all(&buf).and_then(|_| file.sync());
    if let Err(e) = written {
        if let Err(truncate) = file.truncate(before) {
            warn!(error = %truncate, "failed to roll back partial event write");
        }
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl EventStore for JsonlEventStore {
    async fn append(&self, event: &LogEvent) -> Result<()> {
        let line = event.to_json_line()?;
        let file = self.file.clone();

        tokio::task::spawn_blocking(move || {
            let mut file = file
                .lock()
                .map_err(|e| StoreError::Task(format!("writer lock poisoned: {e}")))?;
            append_line(&mut *file, &line)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn scan(&self) -> BoxStream<'_, Result<LogEvent>> {
        stream::unfold(ScanState::Start(self.path.clone()), next_event).boxed()
    }
}

enum ScanState {
    Start(PathBuf),
    Reading {
        lines: Lines<BufReader<tokio::fs::File>>,
        line: u64,
    },
    Done,
}

async fn next_event(state: ScanState) -> Option<(Result<LogEvent>, ScanState)> {
    let (mut lines, mut line) = match state {
        ScanState::Start(path) => match tokio::fs::File::open(&path).await {
            Ok(file) => (BufReader::new(file).lines(), 0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => return Some((Err(e.into()), ScanState::Done)),
        },
        ScanState::Reading { lines, line } => (lines, line),
        ScanState::Done => return None,
    };

    loop {
        match lines.next_line().await {
            Ok(Some(text)) => {
                line += 1;
                if text.trim().is_empty() {
                    continue;
                }
                let item = LogEvent::from_json_line(&text).map_err(|e| StoreError::Corrupt {
                    line,
                    reason: e.to_string(),
                });
                return Some((item, ScanState::Reading { lines, line }));
            }
            Ok(None) => return None,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                let corrupt = StoreError::Corrupt {
                    line: line + 1,
                    reason: e.to_string(),
                };
                return Some((Err(corrupt), ScanState::Done));
            }
            Err(e) => return Some((Err(e.into()), ScanState::Done)),
        }
    }
}
