//! Per-item artifact files: pull-request records and commit diffs

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::record::PullRequestRecord;
use crate::storage::write_atomic;
use std::path::{Path, PathBuf};

/// One JSON file per pull request, named `pr-<number>.json`
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, number: u64) -> PathBuf {
        self.dir.join(format!("pr-{}.json", number))
    }

    pub fn exists(&self, number: u64) -> bool {
        self.path_for(number).is_file()
    }

    /// Writes the full record, replacing any previous version
    pub fn write(&self, record: &PullRequestRecord) -> StorageResult<()> {
        let path = self.path_for(record.number);
        let bytes = serde_json::to_vec_pretty(record).map_err(|source| {
            StorageError::Serialization {
                path: path.clone(),
                source,
            }
        })?;
        write_atomic(&path, &bytes)
    }

    /// Reads a record back
    ///
    /// A missing file or one that no longer matches the record schema reads
    /// as `None`; only I/O failures other than "not found" are errors.
    pub fn read(&self, number: u64) -> StorageResult<Option<PullRequestRecord>> {
        let path = self.path_for(number);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };

        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("Ignoring malformed record {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Counts record files on disk
    pub fn count(&self) -> StorageResult<usize> {
        count_files(&self.dir, |name| name.starts_with("pr-") && name.ends_with(".json"))
    }
}

/// One text file per commit, named `<oid>.diff`
///
/// Commit ids are content addresses, so an existing file is never rewritten
/// and its existence alone marks the diff as fetched.
#[derive(Debug, Clone)]
pub struct DiffStore {
    dir: PathBuf,
}

impl DiffStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, oid: &str) -> PathBuf {
        self.dir.join(format!("{}.diff", oid))
    }

    pub fn exists(&self, oid: &str) -> bool {
        self.path_for(oid).is_file()
    }

    /// Writes a diff through a temporary file so a crash never leaves a
    /// truncated file behind that would later pass the existence check
    pub async fn write(&self, oid: &str, diff: &str) -> StorageResult<()> {
        let path = self.path_for(oid);
        let tmp = temp_path(&path);
        tokio::fs::write(&tmp, diff.as_bytes())
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    /// Counts diff files on disk
    pub fn count(&self) -> StorageResult<usize> {
        count_files(&self.dir, |name| name.ends_with(".diff"))
    }
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn count_files(dir: &Path, matches: impl Fn(&str) -> bool) -> StorageResult<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        if entry
            .file_name()
            .to_str()
            .map(|name| matches(name))
            .unwrap_or(false)
        {
            count += 1;
        }
    }
    Ok(count)
}
