//! Append-only audit trail of performance updates and swarm decisions.
//!
//! [`JsonlAuditSink`] hands encoded lines to a dedicated writer thread, so
//! `append` never blocks a runtime worker on disk I/O. Dropping the sink
//! drains the queue and joins the writer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::registry::PerformanceRecord;
use crate::swarm::ConsensusDecision;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to open audit log {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write audit record: {0}")]
    Write(#[from] std::io::Error),

    #[error("failed to encode audit record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("audit writer for {0} has stopped")]
    Closed(PathBuf),
}

pub type AuditResult<T> = Result<T, AuditError>;

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Performance(PerformanceRecord),
    Decision(Box<ConsensusDecision>),
}

pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> AuditResult<()>;
}

/// JSON-lines file, opened in append mode.
///
/// Lines are written in the order `append` accepted them. Write failures
/// on the writer thread are logged, not returned.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    lines: Mutex<Option<Sender<String>>>,
    writer: Option<JoinHandle<()>>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        let writer_path = path.clone();
        let writer = std::thread::Builder::new()
            .name("audit-writer".into())
            .spawn(move || write_lines(&writer_path, file, rx))?;

        Ok(Self {
            path,
            lines: Mutex::new(Some(tx)),
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_lines(path: &Path, file: File, lines: Receiver<String>) {
    let mut out = BufWriter::new(file);
    while let Ok(line) = lines.recv() {
        // Batch whatever queued up behind this line into one flush.
        let mut result = out.write_all(line.as_bytes());
        for line in lines.try_iter() {
            result = result.and_then(|()| out.write_all(line.as_bytes()));
        }
        if let Err(e) = result.and_then(|()| out.flush()) {
            warn!(path = %path.display(), error = %e, "audit write failed");
        }
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines
            .as_ref()
            .and_then(|tx| tx.send(line).ok())
            .ok_or_else(|| AuditError::Closed(self.path.clone()))
    }
}

impl Drop for JsonlAuditSink {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit.
        self.lines
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!(path = %self.path.display(), "audit writer panicked");
            }
        }
    }
}

/// In-memory sink for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
