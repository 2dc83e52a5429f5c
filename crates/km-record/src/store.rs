//! One-file-per-run record store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::record::{compute_checksum, RunRecord};
use crate::{RecordError, Result};

/// File extension of stored records.
pub const RECORD_EXTENSION: &str = "json";

/// Highest numeric suffix tried for runs sharing a start minute.
const MAX_KEY_SUFFIX: u32 = 99;

/// Result of persisting a record.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// Final key, including any `-N` suffix.
    pub key: String,
    /// Path of the written file.
    pub path: PathBuf,
    /// Size of the written file.
    pub bytes: u64,
    /// SHA-256 of the written file.
    pub sha256: String,
}

/// Summary of a stored record, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct RecordEntry {
    pub key: String,
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    pub profile: String,
    pub samples: usize,
    pub recording: bool,
}

/// Directory of run records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a record with the given key is stored at.
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXTENSION}"))
    }

    /// Write `record` under its start-minute key.
    ///
    /// Re-persisting the same run overwrites its file. A different run that
    /// started in the same minute gets the next free `-2`, `-3`, ... key.
    pub fn persist(&self, record: &RunRecord) -> Result<StoredRecord> {
        let bytes = record.to_json_bytes()?;
        let key = self.free_key(record)?;
        let path = self.path_for_key(&key);
        write_atomic(&path, &bytes)?;

        let stored = StoredRecord {
            key,
            path,
            bytes: bytes.len() as u64,
            sha256: compute_checksum(&bytes),
        };
        info!(
            key = %stored.key,
            path = %stored.path.display(),
            samples = record.samples.len(),
            bytes = stored.bytes,
            "run record persisted"
        );
        Ok(stored)
    }

    fn free_key(&self, record: &RunRecord) -> Result<String> {
        let base = record.key();
        for n in 1..=MAX_KEY_SUFFIX {
            let key = if n == 1 { base.clone() } else { format!("{base}-{n}") };
            let path = self.path_for_key(&key);
            if !path.exists() {
                return Ok(key);
            }
            match Self::load(&path) {
                Ok(existing) if existing.started_at == record.started_at => {
                    debug!(key = %key, "overwriting record of the same run");
                    return Ok(key);
                }
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "existing record unreadable, keeping it"),
            }
        }
        Err(RecordError::KeyExhausted(base))
    }

    /// Load a record file.
    pub fn load(path: &Path) -> Result<RunRecord> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecordError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(RecordError::io(path, e)),
        };
        Self::from_bytes(&bytes).map_err(|e| match e {
            RecordError::Json { source, .. } => RecordError::Json {
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        })
    }

    /// Parse a record from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<RunRecord> {
        RunRecord::from_json_bytes(bytes)
    }

    /// Load the record stored under `key`.
    pub fn load_key(&self, key: &str) -> Result<RunRecord> {
        Self::load(&self.path_for_key(key))
    }

    /// Stored records, newest start first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<RecordEntry>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RecordError::io(&self.dir, e)),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| RecordError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match Self::load(&path) {
                Ok(record) => entries.push(RecordEntry {
                    key,
                    started_at: record.started_at,
                    profile: record.profile_name().to_string(),
                    samples: record.samples.len(),
                    recording: record.recording,
                    path,
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.key.cmp(&a.key)));
        Ok(entries)
    }
}

/// Write `content` to `path` via a temp file in the same directory and a rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RecordError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("record.json");
    let tmp_path = path.with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));
    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| RecordError::io(&tmp_path, e))?;
        file.write_all(content)
            .map_err(|e| RecordError::io(&tmp_path, e))?;
        let _ = file.sync_all();
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        RecordError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn path_for_key_appends_extension() {
        let store = RecordStore::new("/data/history");
        assert_eq!(
            store.path_for_key("2024_03_05-14_07"),
            PathBuf::from("/data/history/2024_03_05-14_07.json")
        );
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = RecordStore::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, RecordError::NotFound(_)));
    }

    #[test]
    fn load_garbage_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        match RecordStore::load(&path).unwrap_err() {
            RecordError::Json { path: Some(p), .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("x.json");
        write_atomic(&path, b"{}").unwrap();
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("x.json")]);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }
}
