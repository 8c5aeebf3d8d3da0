use super::archive::archive_table;
use super::error::{BackupError, IoContext};
use super::manifest::{MANIFEST_FILE_NAME, Manifest, ManifestTable};
use super::progress::{ProgressSink, TableProgress, TableStage};
use super::row_stream::DEFAULT_CHUNK_SIZE;
use super::schema::{SCHEMA_FILE_NAME, snapshot_schema};
use crate::db::{ConnectionTarget, Connector, Session, TableId, list_tables, sanitize_file_name};
use chrono::{DateTime, Local, SecondsFormat};
use core::any::Any;
use core::panic::AssertUnwindSafe;
use futures::FutureExt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use strum::Display;

const LOG_TARGET: &str = "    backup";

const RUN_DIR_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Tunables for a backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    /// Rows fetched per round trip while streaming a table.
    pub chunk_size: usize,

    /// Whether to write `schema.json` before archiving tables.
    pub snapshot_schema: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            snapshot_schema: true,
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,

    /// Combined size of every archive that was written completely.
    pub total_bytes: u64,

    pub manifest: Manifest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
enum RunPhase {
    Created,
    SchemaDone,
    IteratingTables,
    ManifestWritten,
    Done,
}

/// Back up every base table of `database` into a fresh directory under `output_root`.
///
/// Tables are archived one after another over a single connection. A table that fails is logged,
/// recorded as failed in the manifest and skipped; the run carries on with the next one. The run
/// itself fails when the connection cannot be opened, the run directory cannot be created, the
/// schema snapshot or table enumeration fails, or the manifest cannot be written. In that case the
/// run directory is left as it is.
pub async fn run_backup<C: Connector + ?Sized>(
    connector: &C,
    target: ConnectionTarget,
    database: &str,
    output_root: &Path,
    options: &BackupOptions,
    progress: Option<&dyn ProgressSink>,
) -> Result<RunSummary, BackupError> {
    let started = Local::now();

    let run_dir = create_run_dir(output_root, database, started)?;
    log_phase(database, RunPhase::Created, &run_dir);

    let mut session = connector.connect(&target, database).await?;
    log::info!(target: LOG_TARGET, "Backing up database '{database}' from {target} into {}", run_dir.display());

    if options.snapshot_schema {
        let _ = snapshot_schema(&mut session, &run_dir.join(SCHEMA_FILE_NAME)).await?;
        log_phase(database, RunPhase::SchemaDone, &run_dir);
    }

    let tables = list_tables(&mut session).await?;
    log_phase(database, RunPhase::IteratingTables, &run_dir);

    let total = tables.len();
    let mut entries = Vec::with_capacity(total);

    for (index, table) in tables.into_iter().enumerate() {
        let notify = |stage| {
            if let Some(sink) = progress {
                sink.table_progress(&TableProgress {
                    database,
                    table: &table,
                    position: index + 1,
                    total,
                    stage,
                });
            }
        };

        notify(TableStage::Started);

        let attempt = AssertUnwindSafe(archive_one(&mut session, database, &table, &run_dir, options.chunk_size))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(BackupError::query(
                    format!("archiving {table}"),
                    format!("driver panicked: {}", panic_message(&*payload)),
                ))
            });

        let entry = match attempt {
            Ok((rows, bytes)) => {
                log::info!(target: LOG_TARGET, "Backed up {table}: {rows} row(s), {bytes} byte(s)");
                notify(TableStage::Archived { rows, bytes });
                ManifestTable::completed(table, rows, bytes)
            }

            Err(e) => {
                log::warn!(target: LOG_TARGET, "Skipping {table}: {e}");
                notify(TableStage::Failed);
                ManifestTable::failed(table, e.to_string())
            }
        };

        entries.push(entry);
    }

    let manifest = Manifest::new(database, started.to_rfc3339_opts(SecondsFormat::Micros, false), entries);
    let _ = manifest.save(run_dir.join(MANIFEST_FILE_NAME))?;
    log_phase(database, RunPhase::ManifestWritten, &run_dir);

    drop(session);

    let failed = manifest.failed().count();
    if failed > 0 {
        log::warn!(
            target: LOG_TARGET,
            "Database '{database}': {failed} of {} table(s) failed",
            manifest.tables_count
        );
    }

    log_phase(database, RunPhase::Done, &run_dir);
    Ok(RunSummary {
        run_dir,
        total_bytes: manifest.total_size,
        manifest,
    })
}

/// Archive one table and measure the file it produced.
async fn archive_one<S: Session + ?Sized>(
    session: &mut S,
    database: &str,
    table: &TableId,
    run_dir: &Path,
    chunk_size: usize,
) -> Result<(u64, u64), BackupError> {
    let path = run_dir.join(table.archive_file_name());
    let rows = archive_table(session, database, table, &path, chunk_size).await?;
    let bytes = fs::metadata(&path).io_context(|| format!("reading metadata of '{}'", path.display()))?.len();
    Ok((rows, bytes))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Create `{root}/{database}_{timestamp}`, appending `_1`, `_2`, ... until the name is unused.
fn create_run_dir(root: &Path, database: &str, started: DateTime<Local>) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(root).io_context(|| format!("creating '{}'", root.display()))?;

    let base = format!("{}_{}", sanitize_file_name(database), started.format(RUN_DIR_TIMESTAMP_FORMAT));
    let mut suffix = 0_u32;

    loop {
        let name = if suffix == 0 { base.clone() } else { format!("{base}_{suffix}") };
        let path = root.join(name);

        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(BackupError::io(format!("creating '{}'", path.display()), e)),
        }
    }
}

fn log_phase(database: &str, phase: RunPhase, run_dir: &Path) {
    log::debug!(target: LOG_TARGET, "Run of '{database}' at {}: {phase}", run_dir.display());
}
