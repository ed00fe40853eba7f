//! Model store: holds the single active model and swaps it atomically.
//!
//! Readers take wait-free `Arc` snapshots via [`ModelStore::current`];
//! `replace` updates only the pointer, so a slow training run never blocks
//! ingestion. Retired models stay alive for in-flight scoring calls until
//! their last snapshot drops.
//!
//! Persistence is a self-describing JSON artifact written to a temp file
//! and renamed into place, so a crash mid-write leaves the previous
//! artifact intact.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::model::artifact::Model;

/// Errors from loading, persisting, or installing models.
#[derive(Debug)]
pub enum StoreError {
    /// No artifact exists at the configured path
    NotFound(PathBuf),
    /// The artifact exists but cannot be parsed or fails validation
    CorruptArtifact(String),
    /// Filesystem failure while reading or writing the artifact
    Io(std::io::Error),
    /// Offered model version does not advance the installed one
    StaleVersion { installed: u64, offered: u64 },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(path) => write!(f, "no model artifact at {}", path.display()),
            StoreError::CorruptArtifact(reason) => write!(f, "corrupt model artifact: {reason}"),
            StoreError::Io(e) => write!(f, "model artifact IO error: {e}"),
            StoreError::StaleVersion { installed, offered } => write!(
                f,
                "stale model version: {offered} does not advance installed version {installed}"
            ),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Owner of the currently active model for one sensor stream.
pub struct ModelStore {
    current: ArcSwapOption<Model>,
    path: PathBuf,
    /// Last allocated version number
    last_version: AtomicU64,
    /// Serializes installs; readers never take this
    swap_lock: Mutex<()>,
}

impl ModelStore {
    /// Create an empty store persisting to the given artifact path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            current: ArcSwapOption::const_empty(),
            path: path.into(),
            last_version: AtomicU64::new(0),
            swap_lock: Mutex::new(()),
        }
    }

    /// Artifact path this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active model, if any. Wait-free; never blocked by `replace`.
    pub fn current(&self) -> Option<Arc<Model>> {
        self.current.load_full()
    }

    /// Version of the active model, if any.
    pub fn current_version(&self) -> Option<u64> {
        self.current.load().as_ref().map(|m| m.version)
    }

    /// Allocate the next model version. Strictly increasing within a
    /// process lifetime, seeded from the loaded artifact on restore.
    pub fn next_version(&self) -> u64 {
        self.last_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Install a new model as current without touching the disk. The swap
    /// is the only critical section; a handle obtained before the call
    /// stays valid. Fails if the offered version does not advance the
    /// installed one. Durable installs go through [`ModelStore::install`].
    pub fn replace(&self, model: Model) -> Result<Arc<Model>, StoreError> {
        let _guard = self.swap_lock.lock();
        self.swap_locked(model)
    }

    /// Persist and install a new model in one critical section.
    ///
    /// The version check, the artifact write, and the swap all happen under
    /// the install lock, in that order: the loser of a version race fails
    /// with `StaleVersion` before anything touches the disk, so the
    /// artifact on disk never rolls back behind the installed model and
    /// visibility never outruns durability.
    pub fn install(&self, model: Model) -> Result<Arc<Model>, StoreError> {
        let _guard = self.swap_lock.lock();

        if let Some(installed) = self.current_version() {
            if model.version <= installed {
                return Err(StoreError::StaleVersion {
                    installed,
                    offered: model.version,
                });
            }
        }

        self.write_artifact(&model)?;
        self.swap_locked(model)
    }

    /// Durably write an artifact without installing it. Serialized against
    /// installs so a slow write cannot interleave with a newer one.
    pub fn persist(&self, model: &Model) -> Result<(), StoreError> {
        let _guard = self.swap_lock.lock();
        self.write_artifact(model)
    }

    fn swap_locked(&self, model: Model) -> Result<Arc<Model>, StoreError> {
        if let Some(installed) = self.current_version() {
            if model.version <= installed {
                return Err(StoreError::StaleVersion {
                    installed,
                    offered: model.version,
                });
            }
        }

        self.last_version.fetch_max(model.version, Ordering::Relaxed);
        let model = Arc::new(model);
        self.current.store(Some(model.clone()));
        Ok(model)
    }

    /// Writes to a sibling temp file first and renames into place so a
    /// crash never leaves a half-written artifact at the load path.
    fn write_artifact(&self, model: &Model) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(model)
            .map_err(|e| StoreError::CorruptArtifact(format!("serialize failed: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Read and validate the persisted artifact without installing it.
    pub fn load(&self) -> Result<Model, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let model: Model = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::CorruptArtifact(e.to_string()))?;
        model.validate().map_err(StoreError::CorruptArtifact)?;
        Ok(model)
    }

    /// Restore the persisted artifact into the store on startup. Returns
    /// the restored version. Callers fall back to degraded (no-model)
    /// operation on `NotFound` or `CorruptArtifact` instead of crashing.
    pub fn restore(&self) -> Result<u64, StoreError> {
        let model = self.load()?;
        let version = model.version;

        let _guard = self.swap_lock.lock();
        self.last_version.fetch_max(version, Ordering::Relaxed);
        self.current.store(Some(Arc::new(model)));
        Ok(version)
    }
}
