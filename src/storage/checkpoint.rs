//! Durable crawl checkpoint

use crate::state::CrawlState;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::write_atomic;
use std::path::{Path, PathBuf};

/// Reads and writes the single checkpoint file
///
/// The file is the only source of truth across restarts. Reading is forgiving:
/// a missing, unreadable or malformed file, or one written for another
/// repository, means "start over". Writing is strict: every failure is fatal.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads whatever checkpoint is on disk, for any repository
    ///
    /// Returns `None` when the file is absent, unreadable or malformed.
    pub fn peek(&self) -> Option<CrawlState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No checkpoint at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Could not read checkpoint {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!("Checkpoint {} is malformed: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Loads the checkpoint, falling back to a fresh state for `repository`
    pub fn load(&self, repository: &str) -> CrawlState {
        match self.peek() {
            Some(state) if state.repository == repository => state,
            Some(state) => {
                tracing::warn!(
                    "Checkpoint {} belongs to {}, not {}; starting over",
                    self.path.display(),
                    state.repository,
                    repository
                );
                CrawlState::new(repository)
            }
            None => CrawlState::new(repository),
        }
    }

    /// Overwrites the checkpoint with the given state
    pub fn save(&self, state: &CrawlState) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(state).map_err(|source| {
            StorageError::Serialization {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, &bytes)
    }
}
