use super::archive_writer::{ArchiveHeader, ArchiveWriter};
use super::error::{BackupError, IoContext};
use super::row_stream::RowStream;
use crate::db::{Session, TableId};
use chrono::{Local, SecondsFormat};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

const LOG_TARGET: &str = "   archive";

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Stream every row of `table` into a gzip-compressed JSON archive at `output`.
///
/// The column list comes from a zero-row query, then the full table is read through a
/// [`RowStream`] so only one chunk of rows is held at a time. Returns the number of records
/// written.
///
/// On failure the error is returned and whatever was written so far stays on disk as a
/// truncated file. Nothing is created when the table cannot be described or opened.
pub async fn archive_table<S: Session + ?Sized>(
    session: &mut S,
    database: &str,
    table: &TableId,
    output: &Path,
    chunk_size: usize,
) -> Result<u64, BackupError> {
    let columns = session.result_columns(table).await?;
    let mut cursor = session.open_table(table).await?;

    let file = File::create(output).io_context(|| format!("creating '{}'", output.display()))?;
    let backup_timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Micros, false);
    let header = ArchiveHeader {
        database,
        schema: &table.schema,
        table: &table.name,
        columns: &columns,
        backup_timestamp: &backup_timestamp,
    };

    let write_context = || format!("writing '{}'", output.display());
    let mut writer =
        ArchiveWriter::begin(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file), &header).io_context(write_context)?;

    let mut stream = RowStream::new(&mut cursor, columns, chunk_size);
    while let Some(record) = stream.next_record().await? {
        writer.write_record(&record).io_context(write_context)?;
    }

    let rows = writer.row_count();
    let file = writer
        .finish()
        .and_then(|w| w.into_inner().map_err(io::IntoInnerError::into_error))
        .io_context(write_context)?;
    file.sync_all().io_context(|| format!("syncing '{}'", output.display()))?;

    log::debug!(target: LOG_TARGET, "Archived {rows} row(s) of {table} to {}", output.display());
    Ok(rows)
}
