//! Database access for the backup engine
//!
//! The engine never talks to a driver directly. It works against three small traits:
//!
//! - [`Connector`] opens a [`Session`] for a database on a [`ConnectionTarget`].
//! - [`Session`] is one open connection. It answers the catalog questions the engine asks
//!   (tables, databases, column metadata) and opens table cursors.
//! - [`RowCursor`] hands out rows of an open table query in bounded chunks. An empty chunk is
//!   the end-of-data signal.
//!
//! Cells cross the seam already decoded into the closed [`SqlValue`] set, so nothing past this
//! module inspects driver types at runtime.
//!
//! [`mssql`] holds the production implementation on top of `tiberius`. [`catalog`] builds the
//! discovery operations (listing tables and databases, testing a connection) on top of the traits.

pub mod catalog;
pub mod mssql;
mod table_id;
mod target;

#[cfg(test)]
pub(crate) mod fake;

use crate::backup::{BackupError, ColumnDescriptor, SqlValue};
use async_trait::async_trait;

pub use catalog::{ConnectionStatus, DatabaseInfo, list_databases, list_tables, test_connection};
pub use mssql::MssqlConnector;
pub use table_id::{TableId, quote_ident};
pub(crate) use table_id::sanitize_file_name;
pub use target::{ConnectionTarget, Credentials, DEFAULT_PORT};

/// One row, positionally matching the columns of the query that produced it.
pub type Row = Vec<SqlValue>;

/// Opens connections to a server.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Open a connection whose default database is `database`.
    async fn connect(&self, target: &ConnectionTarget, database: &str) -> Result<Self::Session, BackupError>;
}

/// A connection scoped to a single database.
///
/// Calls are strictly sequential: a cursor returned by [`Session::open_table`] borrows the session,
/// so no other query can run until it is dropped.
#[async_trait]
pub trait Session: Send {
    type Cursor<'a>: RowCursor + Send + 'a
    where
        Self: 'a;

    /// Base tables of the current database, in the order the server returns them.
    async fn list_tables(&mut self) -> Result<Vec<TableId>, BackupError>;

    /// All databases on the server, including system and offline ones.
    async fn list_databases(&mut self) -> Result<Vec<DatabaseInfo>, BackupError>;

    /// Column metadata for every base table, grouped by table and in declaration order.
    async fn column_catalog(&mut self) -> Result<Vec<(TableId, ColumnDescriptor)>, BackupError>;

    /// Column names of `table`, obtained without reading any rows.
    async fn result_columns(&mut self, table: &TableId) -> Result<Vec<String>, BackupError>;

    /// Start reading every row of `table`.
    async fn open_table<'a>(&'a mut self, table: &TableId) -> Result<Self::Cursor<'a>, BackupError>;
}

/// An open query producing rows.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch up to `max_rows` rows. Returns an empty chunk once the query is exhausted.
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<Row>, BackupError>;
}
