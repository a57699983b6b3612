//! Append-only incident log.
//!
//! The JSON store keeps the whole log as one array. Every append is a
//! read-modify-rewrite, so appends to the same file are serialized through a
//! process-wide lock keyed by resolved path, and each rewrite lands via an
//! fsynced temp file plus atomic rename. A reader sees either the old array
//! or the new one, never a partial write.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use thiserror::Error;

use crate::pipeline::triage::TriageRecord;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Incident log at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Incident log lock poisoned")]
    LockPoisoned,

    #[error("Persistence task failed: {0}")]
    TaskFailed(String),
}

/// Append-only store of triage records, in insertion order.
pub trait IncidentLog: Send + Sync {
    /// Create an empty log if none exists. Existing content is untouched.
    fn initialize_if_absent(&self) -> Result<(), PersistenceError>;

    /// Add `record` as the last entry. On error the log is unchanged.
    fn append(&self, record: &TriageRecord) -> Result<(), PersistenceError>;

    /// All records, oldest first.
    fn records(&self) -> Result<Vec<TriageRecord>, PersistenceError>;
}

/// One lock per log file for the whole process.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock_for(path: &Path) -> Result<Arc<Mutex<()>>, PersistenceError> {
    let mut locks = FILE_LOCKS
        .lock()
        .map_err(|_| PersistenceError::LockPoisoned)?;
    Ok(Arc::clone(locks.entry(path.to_path_buf()).or_default()))
}

/// Resolve `path` to one spelling per file: the deepest existing ancestor is
/// canonicalized (symlinks, `..`), the missing tail is normalized lexically.
fn resolve_log_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let components: Vec<Component<'_>> = absolute.components().collect();

    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        let Ok(mut resolved) = std::fs::canonicalize(&prefix) else {
            continue;
        };
        for component in &components[split..] {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::CurDir => {}
                other => resolved.push(other.as_os_str()),
            }
        }
        return Ok(resolved);
    }

    Ok(absolute)
}

/// Incident log persisted as a single pretty-printed JSON array.
pub struct JsonIncidentLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonIncidentLog {
    /// Bind to `path` without creating anything. Different spellings of the
    /// same file share one lock.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = resolve_log_path(path.as_ref())?;
        let lock = lock_for(&path)?;
        Ok(Self { path, lock })
    }

    /// Bind to `path` and make sure the log exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let log = Self::new(path)?;
        log.initialize_if_absent()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries as raw JSON so appends preserve anything already on disk.
    fn read_entries(&self) -> Result<Vec<serde_json::Value>, PersistenceError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| PersistenceError::Corrupted {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write_entries(&self, entries: &[serde_json::Value]) -> Result<(), PersistenceError> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "log path has no parent directory")
        })?;
        std::fs::create_dir_all(parent)?;

        // Same directory so the rename stays on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, entries)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PersistenceError::Io(e.error))?;

        // Make the rename itself durable.
        match std::fs::File::open(parent).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(e) => tracing::warn!(
                dir = %parent.display(),
                error = %e,
                "Could not fsync incident log directory"
            ),
        }
        Ok(())
    }
}

impl IncidentLog for JsonIncidentLog {
    fn initialize_if_absent(&self) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        if self.path.exists() {
            return Ok(());
        }
        self.write_entries(&[])?;
        tracing::info!(path = %self.path.display(), "Initialized empty incident log");
        Ok(())
    }

    fn append(&self, record: &TriageRecord) -> Result<(), PersistenceError> {
        let entry = serde_json::to_value(record)?;

        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        let mut entries = self.read_entries()?;
        entries.push(entry);
        self.write_entries(&entries)?;

        tracing::debug!(
            incident_id = %record.id,
            total = entries.len(),
            "Appended triage record"
        );
        Ok(())
    }

    fn records(&self) -> Result<Vec<TriageRecord>, PersistenceError> {
        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        self.read_entries()?
            .into_iter()
            .map(|entry| {
                serde_json::from_value(entry).map_err(|e| PersistenceError::Corrupted {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

/// Volatile log for embedding and tests.
#[derive(Default)]
pub struct MemoryIncidentLog {
    records: Mutex<Vec<TriageRecord>>,
}

impl MemoryIncidentLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IncidentLog for MemoryIncidentLog {
    fn initialize_if_absent(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn append(&self, record: &TriageRecord) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?
            .push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<TriageRecord>, PersistenceError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| PersistenceError::LockPoisoned)?
            .clone())
    }
}
