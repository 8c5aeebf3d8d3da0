use super::document;
use super::error::BackupError;
use crate::db::TableId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::Display;

/// File name of the manifest inside a run directory.
pub const MANIFEST_FILE_NAME: &str = "backup_manifest.json";

/// Format tag identifying streamed JSON archives.
pub const BACKUP_TYPE: &str = "streaming_json";

/// Compression tag for gzip archives.
pub const COMPRESSION: &str = "gzip";

/// Outcome of one table within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableStatus {
    Completed,
    Failed,
}

/// One attempted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestTable {
    #[serde(flatten)]
    pub id: TableId,

    pub status: TableStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManifestTable {
    #[must_use]
    pub const fn completed(id: TableId, rows: u64, size: u64) -> Self {
        Self {
            id,
            status: TableStatus::Completed,
            rows: Some(rows),
            size: Some(size),
            error: None,
        }
    }

    #[must_use]
    pub const fn failed(id: TableId, error: String) -> Self {
        Self {
            id,
            status: TableStatus::Failed,
            rows: None,
            size: None,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TableStatus::Completed
    }
}

/// The document closing out a backup run.
///
/// `tables` lists every table the run attempted, whatever its outcome. `total_size` only counts
/// archives that were written completely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub database: String,
    pub backup_timestamp: String,
    pub backup_type: String,
    pub tables_count: usize,
    pub total_size: u64,
    pub compression: String,
    pub tables: Vec<ManifestTable>,
}

impl Manifest {
    #[must_use]
    pub fn new(database: impl Into<String>, backup_timestamp: impl Into<String>, tables: Vec<ManifestTable>) -> Self {
        let total_size = tables.iter().filter_map(|t| t.size).sum();

        Self {
            database: database.into(),
            backup_timestamp: backup_timestamp.into(),
            backup_type: BACKUP_TYPE.to_string(),
            tables_count: tables.len(),
            total_size,
            compression: COMPRESSION.to_string(),
            tables,
        }
    }

    pub fn completed(&self) -> impl Iterator<Item = &ManifestTable> {
        self.tables.iter().filter(|t| t.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ManifestTable> {
        self.tables.iter().filter(|t| !t.is_completed())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BackupError> {
        document::load(path)
    }

    /// Write the manifest atomically, returning its size on disk.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<u64, BackupError> {
        document::save(self, path)
    }
}
