//! Checkpoint store: persists the scanner's resumption point between runs.
//!
//! A checkpoint is a single hex hash: the hash of the last block exported,
//! which is the parent hash the first block of the next run must declare.
//! No checkpoint means the next run starts at the first block in the store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::ScanError;

/// Trait for loading and saving the resumption hash.
///
/// Implementations: [`FileCheckpointStore`] and [`MemoryCheckpointStore`].
pub trait CheckpointStore: Send + Sync {
    /// Load the saved hash, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<String>, ScanError>;

    /// Save (overwrite) the hash.
    fn save(&self, hash: &str) -> Result<(), ScanError>;

    /// Delete the checkpoint (next run starts from genesis).
    fn delete(&self) -> Result<(), ScanError>;
}

// ─── File store ───────────────────────────────────────────────────────────────

/// Checkpoint kept in a plain text file holding only the hex hash.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<String>, ScanError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let hash = content.trim();
                if hash.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(hash.to_string()))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScanError::Io(e)),
        }
    }

    fn save(&self, hash: &str) -> Result<(), ScanError> {
        // Write-then-rename: readers see either the old hash or the new one.
        let staging = self.staging_path();
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(hash.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        tracing::debug!(path = %self.path.display(), hash, "Checkpoint saved");
        Ok(())
    }

    fn delete(&self) -> Result<(), ScanError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScanError::Io(e)),
        }
    }
}

// ─── Manager ──────────────────────────────────────────────────────────────────

/// Owns the checkpoint store for the duration of a run.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Box<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub fn load(&self) -> Result<Option<String>, ScanError> {
        self.store.load()
    }

    /// Save immediately, propagating any failure.
    pub fn force_save(&self, hash: &str) -> Result<(), ScanError> {
        self.store.save(hash)
    }

    /// Save on a failure path: errors are logged, never returned.
    ///
    /// Returns `true` if the checkpoint was written.
    pub fn save_best_effort(&self, hash: Option<&str>) -> bool {
        let Some(hash) = hash else {
            return false;
        };
        match self.store.save(hash) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(hash, error = %e, "Best-effort checkpoint save failed");
                false
            }
        }
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

use std::sync::{Arc, Mutex};

/// In-memory checkpoint store for tests and dry runs.
///
/// Clones share the same slot, so a test can keep a handle after moving one
/// into a [`CheckpointManager`].
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpointStore {
    data: Arc<Mutex<Option<String>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hash(hash: impl Into<String>) -> Self {
        Self {
            data: Arc::new(Mutex::new(Some(hash.into()))),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<String>, ScanError> {
        Ok(self.get())
    }

    fn save(&self, hash: &str) -> Result<(), ScanError> {
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = Some(hash.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), ScanError> {
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
