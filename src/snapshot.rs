//! Persisted run state: `filesA.old`/`filesB.old` snapshots, the
//! empty-directory list, `last_run.time`, and the hash cache, all living
//! under `<root>/.pyco-sync/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::index::FileIndex;
use crate::record::FileRecord;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },

    #[error("failed to parse snapshot {path}: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },

    #[error(transparent)]
    Index(#[from] crate::index::IndexError),
}

pub const STATE_DIR: &str = ".pyco-sync";

pub struct SnapshotStore {
    root: PathBuf,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HashCacheEntry {
    pub path: String,
    pub size: u64,
    pub mtime: f64,
    pub hashes: BTreeMap<String, String>,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir().join("backups")
    }

    fn files_path(&self, side: &str) -> PathBuf {
        self.state_dir().join(format!("files{side}.old"))
    }

    fn empty_dirs_path(&self) -> PathBuf {
        self.state_dir().join("empty_dirs")
    }

    fn last_run_path(&self) -> PathBuf {
        self.state_dir().join("last_run.time")
    }

    fn hash_db_path(&self) -> PathBuf {
        self.state_dir().join("hash_db.json")
    }

    pub fn exists(&self) -> bool {
        self.state_dir().is_dir()
    }

    fn tmp_dir(&self) -> PathBuf {
        self.state_dir().join("tmp")
    }

    /// Write `text` to `path` via write-to-temp-then-rename, so a crash
    /// mid-write never leaves a torn snapshot for the next run to load.
    fn write_atomic(&self, path: &Path, text: &str) -> Result<(), SnapshotError> {
        let tmp_dir = self.tmp_dir();
        fs::create_dir_all(&tmp_dir)
            .map_err(|source| SnapshotError::Write { path: tmp_dir.display().to_string(), source })?;
        let temp_path = crate::io::generate_temp_path(&tmp_dir);
        let mut writer = crate::io::AtomicWriter::new(temp_path, path.to_path_buf(), false)
            .map_err(|source| SnapshotError::Write { path: path.display().to_string(), source })?;
        writer.write(text.as_bytes()).map_err(|source| SnapshotError::Write { path: path.display().to_string(), source })?;
        writer.commit(None).map_err(|source| SnapshotError::Write { path: path.display().to_string(), source })
    }

    pub fn init(&self) -> Result<(), SnapshotError> {
        for dir in [self.state_dir(), self.logs_dir(), self.backups_dir()] {
            fs::create_dir_all(&dir).map_err(|source| SnapshotError::Write {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Load a side's previous snapshot, or an empty index if this is the
    /// first run.
    pub fn load_side(&self, side: &str) -> Result<FileIndex, SnapshotError> {
        let path = self.files_path(side);
        if !path.exists() {
            return Ok(FileIndex::new());
        }
        let text = fs::read_to_string(&path)
            .map_err(|source| SnapshotError::Read { path: path.display().to_string(), source })?;
        let records: Vec<FileRecord> = serde_json::from_str(&text)
            .map_err(|source| SnapshotError::Parse { path: path.display().to_string(), source })?;
        Ok(FileIndex::from_records(records)?)
    }

    /// Persist a side's current snapshot, overwriting the previous one.
    pub fn save_side(&self, side: &str, index: &FileIndex) -> Result<(), SnapshotError> {
        let records: Vec<&FileRecord> = index.iter().collect();
        let text = serde_json::to_string_pretty(&records).expect("FileRecord serialization is infallible");
        let path = self.files_path(side);
        self.write_atomic(&path, &text)
    }

    /// Rename the existing snapshot aside with a timestamp suffix before
    /// overwriting, used by `reset --backup`.
    pub fn backup_side_snapshot(&self, side: &str, timestamp: &str) -> Result<(), SnapshotError> {
        let path = self.files_path(side);
        if path.exists() {
            let backup_path = self.state_dir().join(format!("files{side}.old.{timestamp}"));
            fs::rename(&path, &backup_path)
                .map_err(|source| SnapshotError::Write { path: backup_path.display().to_string(), source })?;
        }
        Ok(())
    }

    pub fn load_empty_dirs(&self) -> Result<Vec<String>, SnapshotError> {
        let path = self.empty_dirs_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .map_err(|source| SnapshotError::Read { path: path.display().to_string(), source })?;
        serde_json::from_str(&text).map_err(|source| SnapshotError::Parse { path: path.display().to_string(), source })
    }

    pub fn save_empty_dirs(&self, dirs: &[String]) -> Result<(), SnapshotError> {
        let text = serde_json::to_string_pretty(dirs).expect("Vec<String> serialization is infallible");
        let path = self.empty_dirs_path();
        self.write_atomic(&path, &text)
    }

    pub fn load_last_run(&self) -> Result<f64, SnapshotError> {
        let path = self.last_run_path();
        if !path.exists() {
            return Ok(0.0);
        }
        let text = fs::read_to_string(&path)
            .map_err(|source| SnapshotError::Read { path: path.display().to_string(), source })?;
        Ok(text.trim().parse().unwrap_or(0.0))
    }

    pub fn save_last_run(&self, time: f64) -> Result<(), SnapshotError> {
        let path = self.last_run_path();
        self.write_atomic(&path, &format!("{time}"))
    }

    pub fn now_epoch_secs() -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    pub fn load_hash_db(&self) -> Result<Vec<HashCacheEntry>, SnapshotError> {
        let path = self.hash_db_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .map_err(|source| SnapshotError::Read { path: path.display().to_string(), source })?;
        serde_json::from_str(&text).map_err(|source| SnapshotError::Parse { path: path.display().to_string(), source })
    }

    pub fn save_hash_db(&self, entries: &[HashCacheEntry]) -> Result<(), SnapshotError> {
        let text = serde_json::to_string_pretty(entries).expect("HashCacheEntry serialization is infallible");
        let path = self.hash_db_path();
        self.write_atomic(&path, &text)
    }
}

/// Build the next run's hash cache entries from a freshly walked index, so
/// `save_hash_db` has something to persist once a walk has computed hashes.
pub fn hash_cache_from_index(index: &FileIndex) -> Vec<HashCacheEntry> {
    index
        .iter()
        .filter(|rec| !rec.hashes.is_empty())
        .map(|rec| HashCacheEntry { path: rec.path.clone(), size: rec.size, mtime: rec.mtime, hashes: rec.hashes.clone() })
        .collect()
}

pub fn timestamp_now() -> String {
    // A plain seconds-since-epoch integer is enough uniqueness for a
    // single process; human-readable run directories are a display-layer
    // nicety the driver can add if it ever formats one with chrono.
    format!("{}", SnapshotStore::now_epoch_secs() as u64)
}

pub fn is_state_path(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root.join(STATE_DIR))
}
