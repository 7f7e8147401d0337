use crate::error::{Result, ShardError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Incomplete,
    Complete,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Incomplete => "incomplete",
            FileStatus::Complete => "complete",
            FileStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    #[serde(default)]
    pub status: FileStatus,
    pub filename: String,
    /// Node address per fragment index.
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    fn new(filename: &str) -> Self {
        Self {
            status: FileStatus::Incomplete,
            filename: filename.to_string(),
            addresses: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn fragment_count(&self) -> usize {
        self.addresses.len()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    files: HashMap<String, FileRecord>,
}

/// FragmentRegistry is the durable filename -> [`FileRecord`] map.
///
/// Every mutation rewrites the whole snapshot at `snapshot_path` while the
/// registry lock is held. The snapshot is written to a sibling temp file and
/// renamed into place. A failed write is returned to the caller, but the
/// in-memory change is kept, so memory and disk may disagree until the next
/// successful mutation.
pub struct FragmentRegistry {
    snapshot_path: PathBuf,
    files: Mutex<HashMap<String, FileRecord>>,
}

impl FragmentRegistry {
    /// Load the snapshot at `snapshot_path`, starting empty if it does not exist.
    pub fn open(snapshot_path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot_path = snapshot_path.into();

        let files = match std::fs::read(&snapshot_path) {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?.files,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => return Err(error.into()),
        };

        tracing::info!(
            "Loaded fragment registry from {} ({} files)",
            snapshot_path.display(),
            files.len()
        );

        Ok(Self {
            snapshot_path,
            files: Mutex::new(files),
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub async fn append_fragment(&self, filename: &str, address: &str) -> Result<()> {
        let mut files = self.files.lock().await;

        let record = files
            .entry(filename.to_string())
            .or_insert_with(|| FileRecord::new(filename));
        record.addresses.push(address.to_string());
        record.updated_at = Utc::now();

        self.persist(&files)
    }

    pub async fn set_status(&self, filename: &str, status: FileStatus) -> Result<()> {
        let mut files = self.files.lock().await;

        let record = files
            .get_mut(filename)
            .ok_or_else(|| ShardError::FileNotFound(filename.to_string()))?;
        record.status = status;
        record.updated_at = Utc::now();

        self.persist(&files)
    }

    /// Remove `filename`. Removing an absent record still rewrites the snapshot.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let mut files = self.files.lock().await;
        files.remove(filename);
        self.persist(&files)
    }

    pub async fn get(&self, filename: &str) -> Option<FileRecord> {
        self.files.lock().await.get(filename).cloned()
    }

    pub async fn list(&self) -> Vec<FileRecord> {
        let files = self.files.lock().await;
        let mut records: Vec<FileRecord> = files.values().cloned().collect();
        records.sort_by(|a, b| a.filename.cmp(&b.filename));
        records
    }

    pub async fn failed(&self) -> Vec<FileRecord> {
        let files = self.files.lock().await;
        let mut records: Vec<FileRecord> = files
            .values()
            .filter(|record| record.status == FileStatus::Failed)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.filename.cmp(&b.filename));
        records
    }

    fn persist(&self, files: &HashMap<String, FileRecord>) -> Result<()> {
        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            files: &'a HashMap<String, FileRecord>,
        }

        let payload = serde_json::to_vec_pretty(&SnapshotRef { files })?;

        if let Some(parent) = self.snapshot_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self
            .snapshot_path
            .with_extension(format!("{}.tmp", ulid::Ulid::new()));
        std::fs::write(&tmp_path, &payload)?;
        if let Err(error) = std::fs::rename(&tmp_path, &self.snapshot_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(error.into());
        }

        tracing::debug!("Wrote fragment registry snapshot ({} files)", files.len());
        Ok(())
    }
}
