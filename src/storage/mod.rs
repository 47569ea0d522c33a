//! Storage module for persisting crawl data
//!
//! This module owns the on-disk layout under the output root:
//! - `checkpoint.json`: the crawl checkpoint
//! - `prs/pr-<number>.json`: one merged record per pull request
//! - `diffs/<oid>.diff`: one raw diff per commit
//!
//! Every file is written through a temporary sibling and renamed into place.

mod artifacts;
mod checkpoint;
mod error;
mod record;

pub use artifacts::{DiffStore, RecordStore};
pub use checkpoint::CheckpointStore;
pub use error::{StorageError, StorageResult};
pub use record::{NestedConnection, NestedField, PullRequestRecord};

use std::io::Write;
use std::path::{Path, PathBuf};

/// Paths of every artifact under one output root
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root.join("prs")
    }

    pub fn diffs_dir(&self) -> PathBuf {
        self.root.join("diffs")
    }

    /// Creates the output directories if they do not exist
    pub fn create_dirs(&self) -> StorageResult<()> {
        for dir in [self.records_dir(), self.diffs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn checkpoint(&self) -> CheckpointStore {
        CheckpointStore::new(self.checkpoint_path())
    }

    pub fn records(&self) -> RecordStore {
        RecordStore::new(self.records_dir())
    }

    pub fn diffs(&self) -> DiffStore {
        DiffStore::new(self.diffs_dir())
    }
}

/// Replaces `path` with `bytes` via a synced temporary file and a rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = artifacts::temp_path(path);

    let mut file = std::fs::File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| StorageError::io(&tmp, e))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}
