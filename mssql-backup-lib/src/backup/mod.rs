//! The backup engine
//!
//! A backup run exports one database into a directory of its own:
//!
//! ```text
//! {output_root}/{database}_{YYYYmmdd_HHMMSS}/
//!     schema.json              column catalog of every base table
//!     {schema}_{table}.json.gz one streamed archive per table
//!     backup_manifest.json     summary written once every table was attempted
//! ```
//!
//! The pieces, leaf first:
//!
//! - [`value`] turns decoded cells into portable text.
//! - [`row_stream`] pulls rows from a cursor in bounded chunks and hands them out as records.
//! - [`archive_writer`] and [`archive`] write a table's records into a gzip-compressed JSON
//!   document without holding more than one chunk in memory.
//! - [`schema`] captures the column catalog.
//! - [`orchestrator`] drives a whole run, isolating per-table failures, and writes the
//!   [`manifest`].
//! - [`verify`] checks a finished run against its manifest.

pub mod archive;
pub mod archive_writer;
mod document;
mod error;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod row_stream;
pub mod schema;
pub mod value;
pub mod verify;

pub use archive::archive_table;
pub use error::{BackupError, IoContext};
pub use manifest::{MANIFEST_FILE_NAME, Manifest, ManifestTable, TableStatus};
pub use orchestrator::{BackupOptions, RunSummary, run_backup};
pub use progress::{ProgressSink, TableProgress, TableStage};
pub use row_stream::{DEFAULT_CHUNK_SIZE, Record, RowStream};
pub use schema::{ColumnDescriptor, SCHEMA_FILE_NAME, SchemaSnapshot, TableSchema, snapshot_schema};
pub use value::{SqlValue, Temporal, normalize};
pub use verify::{TableCheck, VerifyReport, verify_run};
