//! Read-only checks of a finished run directory.
//!
//! Verification reloads the manifest, then decompresses and parses every archive the manifest
//! lists as completed. Records are counted as they are parsed and never collected, so checking a
//! large archive takes no more memory than writing it did.

use super::error::{BackupError, IoContext};
use super::manifest::{MANIFEST_FILE_NAME, Manifest, TableStatus};
use crate::db::TableId;
use core::fmt::{Display, Formatter, Result as FmtResult};
use flate2::read::GzDecoder;
use serde::de::{Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "    verify";

/// What was found for one table of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableCheck {
    /// The archive parses and matches the manifest.
    Valid { rows: u64 },

    /// The manifest records the table as failed, so there is nothing to check.
    Skipped,

    Missing,
    SizeMismatch { expected: u64, actual: u64 },
    RowCountMismatch { expected: u64, actual: u64 },
    HeaderMismatch,
    Corrupt { reason: String },
}

impl TableCheck {
    #[must_use]
    pub const fn is_problem(&self) -> bool {
        !matches!(self, Self::Valid { .. } | Self::Skipped)
    }
}

impl Display for TableCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Valid { rows } => write!(f, "ok, {rows} row(s)"),
            Self::Skipped => write!(f, "skipped, failed during backup"),
            Self::Missing => write!(f, "archive file is missing"),
            Self::SizeMismatch { expected, actual } => write!(f, "archive is {actual} byte(s), manifest says {expected}"),
            Self::RowCountMismatch { expected, actual } => write!(f, "archive holds {actual} row(s), manifest says {expected}"),
            Self::HeaderMismatch => write!(f, "archive header names a different table"),
            Self::Corrupt { reason } => write!(f, "archive is unreadable: {reason}"),
        }
    }
}

/// The outcome of verifying a run directory.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub run_dir: PathBuf,
    pub manifest: Manifest,
    pub tables: Vec<(TableId, TableCheck)>,

    /// Whether the manifest's `total_size` equals the sum of its completed tables' sizes.
    pub total_size_consistent: bool,
}

impl VerifyReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.total_size_consistent && self.problems().next().is_none()
    }

    pub fn problems(&self) -> impl Iterator<Item = &(TableId, TableCheck)> {
        self.tables.iter().filter(|(_, check)| check.is_problem())
    }
}

/// Check every archive of the run in `run_dir` against its manifest.
///
/// Fails only when the manifest itself cannot be read. Problems with individual archives are
/// reported in the returned [`VerifyReport`].
pub fn verify_run(run_dir: impl AsRef<Path>) -> Result<VerifyReport, BackupError> {
    let run_dir = run_dir.as_ref();
    let manifest = Manifest::load(run_dir.join(MANIFEST_FILE_NAME))?;

    let tables = manifest
        .tables
        .iter()
        .map(|entry| {
            let check = match entry.status {
                TableStatus::Failed => TableCheck::Skipped,
                TableStatus::Completed => check_archive(run_dir, &manifest.database, &entry.id, entry.rows, entry.size),
            };

            if check.is_problem() {
                log::warn!(target: LOG_TARGET, "{}: {check}", entry.id);
            } else {
                log::debug!(target: LOG_TARGET, "{}: {check}", entry.id);
            }

            (entry.id.clone(), check)
        })
        .collect();

    let expected_total: u64 = manifest.completed().filter_map(|t| t.size).sum();

    Ok(VerifyReport {
        run_dir: run_dir.to_path_buf(),
        total_size_consistent: expected_total == manifest.total_size,
        manifest,
        tables,
    })
}

fn check_archive(run_dir: &Path, database: &str, table: &TableId, rows: Option<u64>, size: Option<u64>) -> TableCheck {
    let path = run_dir.join(table.archive_file_name());

    let actual_size = match fs::metadata(&path) {
        Ok(metadata) => metadata.len(),
        Err(_) => return TableCheck::Missing,
    };

    if let Some(expected) = size
        && expected != actual_size
    {
        return TableCheck::SizeMismatch {
            expected,
            actual: actual_size,
        };
    }

    let summary = match read_summary(&path) {
        Ok(summary) => summary,
        Err(e) => return TableCheck::Corrupt { reason: e.to_string() },
    };

    if summary.database != database || summary.schema != table.schema || summary.table != table.name {
        return TableCheck::HeaderMismatch;
    }

    match rows {
        Some(expected) if expected != summary.data.0 => TableCheck::RowCountMismatch {
            expected,
            actual: summary.data.0,
        },
        _ => TableCheck::Valid { rows: summary.data.0 },
    }
}

fn read_summary(path: &Path) -> Result<ArchiveSummary, BackupError> {
    let file = File::open(path).io_context(|| format!("opening '{}'", path.display()))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    serde_json::from_reader(BufReader::new(decoder))
        .map_err(std::io::Error::from)
        .io_context(|| format!("parsing '{}'", path.display()))
}

/// The parts of an archive that verification looks at.
#[derive(Debug, Deserialize)]
struct ArchiveSummary {
    database: String,
    schema: String,
    table: String,

    #[expect(dead_code, reason = "parsed to validate the header shape")]
    columns: Vec<String>,

    #[expect(dead_code, reason = "parsed to validate the header shape")]
    backup_timestamp: String,

    data: RecordCount,
}

/// Number of elements in a JSON array, counted without keeping them.
#[derive(Debug)]
struct RecordCount(u64);

impl<'de> Deserialize<'de> for RecordCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountVisitor;

        impl<'de> Visitor<'de> for CountVisitor {
            type Value = RecordCount;

            fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str("an array of records")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RecordCount, A::Error> {
                let mut count = 0;
                while seq.next_element::<IgnoredAny>()?.is_some() {
                    count += 1;
                }
                Ok(RecordCount(count))
            }
        }

        deserializer.deserialize_seq(CountVisitor)
    }
}
