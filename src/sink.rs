//! Output collaborators drained by the output stage.
//!
//! - `ResultsSink`: append-only detection log, one record per target
//! - `FramePersister`: writes annotated frames in intermediate mode
//!
//! Failures are returned, never swallowed; the output stage decides to log and move on.

use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::detect::Target;
use crate::frame::Frame;

pub trait ResultsSink: Send + Sync {
    fn append(&self, target: &Target) -> Result<()>;
}

pub trait FramePersister: Send + Sync {
    fn save(&self, frame: &Frame, dir: &Path) -> Result<PathBuf>;
}

// ----------------------------------------------------------------------------
// File-backed implementations
// ----------------------------------------------------------------------------

/// JSON-lines detection log. The file is opened and closed around every write,
/// so a crash loses at most the record being written.
#[derive(Debug, Clone)]
pub struct FileResultsSink {
    path: PathBuf,
}

impl FileResultsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsSink for FileResultsSink {
    fn append(&self, target: &Target) -> Result<()> {
        let mut record = target.to_record()?;
        record.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open results log {}", self.path.display()))?;
        file.write_all(record.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}

/// Persists frames through `Frame::save`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotatedFramePersister;

impl FramePersister for AnnotatedFramePersister {
    fn save(&self, frame: &Frame, dir: &Path) -> Result<PathBuf> {
        frame.save(dir)
    }
}

// ----------------------------------------------------------------------------
// In-memory implementations
// ----------------------------------------------------------------------------

/// Collects targets in memory.
#[derive(Debug, Default)]
pub struct InMemoryResultsSink {
    records: Mutex<Vec<Target>>,
}

impl InMemoryResultsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Target> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl ResultsSink for InMemoryResultsSink {
    fn append(&self, target: &Target) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow!("results sink lock poisoned"))?
            .push(target.clone());
        Ok(())
    }
}

/// Records which frames were persisted without writing anything.
#[derive(Debug, Default)]
pub struct InMemoryFramePersister {
    saved: Mutex<Vec<u64>>,
}

impl InMemoryFramePersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence numbers of saved frames, in save order.
    pub fn saved(&self) -> Vec<u64> {
        self.saved
            .lock()
            .map(|saved| saved.clone())
            .unwrap_or_default()
    }
}

impl FramePersister for InMemoryFramePersister {
    fn save(&self, frame: &Frame, dir: &Path) -> Result<PathBuf> {
        self.saved
            .lock()
            .map_err(|_| anyhow!("frame persister lock poisoned"))?
            .push(frame.seq);
        Ok(dir.join(frame.file_name()))
    }
}
