//! In-memory implementation of the database traits for tests.

use super::{ConnectionTarget, Connector, DatabaseInfo, Row, RowCursor, Session, TableId};
use crate::backup::{BackupError, ColumnDescriptor, SqlValue};
use async_trait::async_trait;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub id: TableId,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    pub fail_open: bool,
    pub fail_after_rows: Option<usize>,
    pub panic_on_columns: bool,
}

impl FakeTable {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            id: TableId::new(schema, name),
            columns: Vec::new(),
            rows: Vec::new(),
            fail_open: false,
            fail_after_rows: None,
            panic_on_columns: false,
        }
    }

    pub fn column(mut self, name: &str, data_type: &str) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default: None,
            max_length: None,
        });
        self
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn text_rows(mut self, count: usize) -> Self {
        for i in 0..count {
            self.rows.push(self.columns.iter().map(|c| SqlValue::Text(format!("{}-{i}", c.name))).collect());
        }
        self
    }

    pub const fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Panic while reading the column metadata, as a driver does on a type it cannot decode.
    pub const fn panicking_columns(mut self) -> Self {
        self.panic_on_columns = true;
        self
    }

    pub const fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after_rows = Some(rows);
        self
    }
}

/// Records what the engine asked of the fake.
#[derive(Debug, Default)]
pub struct Stats {
    pub connections: AtomicUsize,
    pub largest_chunk_requested: AtomicUsize,
    pub largest_chunk_returned: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    databases: BTreeMap<String, Vec<FakeTable>>,
    catalog: Option<Vec<DatabaseInfo>>,
    refuse: bool,
    fail_column_catalog: bool,
    connect_delay: Option<Duration>,
    pub stats: Arc<Stats>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, name: &str, tables: Vec<FakeTable>) -> Self {
        let _ = self.databases.insert(name.to_string(), tables);
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<DatabaseInfo>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub const fn refusing_connections(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub const fn failing_column_catalog(mut self) -> Self {
        self.fail_column_catalog = true;
        self
    }

    pub const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }
}

#[async_trait]
impl Connector for FakeServer {
    type Session = FakeSession;

    async fn connect(&self, target: &ConnectionTarget, database: &str) -> Result<FakeSession, BackupError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        if self.refuse {
            return Err(BackupError::connection(target.to_string(), "connection refused"));
        }

        let _ = self.stats.connections.fetch_add(1, Ordering::Relaxed);

        let catalog = self.catalog.clone().unwrap_or_else(|| {
            self.databases
                .keys()
                .zip(5..)
                .map(|(name, database_id)| DatabaseInfo {
                    name: name.clone(),
                    database_id,
                    online: true,
                })
                .collect()
        });

        Ok(FakeSession {
            tables: self.databases.get(database).cloned().unwrap_or_default(),
            catalog,
            fail_column_catalog: self.fail_column_catalog,
            stats: Arc::clone(&self.stats),
        })
    }
}

#[derive(Debug)]
pub struct FakeSession {
    tables: Vec<FakeTable>,
    catalog: Vec<DatabaseInfo>,
    fail_column_catalog: bool,
    stats: Arc<Stats>,
}

impl FakeSession {
    fn find(&self, table: &TableId) -> Result<&FakeTable, BackupError> {
        self.tables
            .iter()
            .find(|t| &t.id == table)
            .ok_or_else(|| BackupError::query(format!("reading {table}"), format!("Invalid object name '{table}'")))
    }
}

#[async_trait]
impl Session for FakeSession {
    type Cursor<'a> = FakeCursor<'a>;

    async fn list_tables(&mut self) -> Result<Vec<TableId>, BackupError> {
        Ok(self.tables.iter().map(|t| t.id.clone()).collect())
    }

    async fn list_databases(&mut self) -> Result<Vec<DatabaseInfo>, BackupError> {
        Ok(self.catalog.clone())
    }

    async fn column_catalog(&mut self) -> Result<Vec<(TableId, ColumnDescriptor)>, BackupError> {
        if self.fail_column_catalog {
            return Err(BackupError::query("reading column catalog", "permission denied"));
        }

        Ok(self
            .tables
            .iter()
            .flat_map(|t| t.columns.iter().map(|c| (t.id.clone(), c.clone())))
            .collect())
    }

    async fn result_columns(&mut self, table: &TableId) -> Result<Vec<String>, BackupError> {
        let table = self.find(table)?;
        if table.panic_on_columns {
            panic!("not yet implemented: column type 0xF0");
        }

        if table.fail_open {
            return Err(BackupError::query(format!("reading the columns of {}", table.id), "permission denied"));
        }

        Ok(table.columns.iter().map(|c| c.name.clone()).collect())
    }

    async fn open_table<'a>(&'a mut self, table: &TableId) -> Result<Self::Cursor<'a>, BackupError> {
        let table = self.find(table)?;
        if table.fail_open {
            return Err(BackupError::query(format!("reading {}", table.id), "permission denied"));
        }

        Ok(FakeCursor {
            rows: &table.rows,
            position: 0,
            fail_after_rows: table.fail_after_rows,
            stats: Arc::clone(&self.stats),
        })
    }
}

#[derive(Debug)]
pub struct FakeCursor<'a> {
    rows: &'a [Row],
    position: usize,
    fail_after_rows: Option<usize>,
    stats: Arc<Stats>,
}

#[async_trait]
impl RowCursor for FakeCursor<'_> {
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<Row>, BackupError> {
        let _ = self.stats.largest_chunk_requested.fetch_max(max_rows, Ordering::Relaxed);

        if let Some(limit) = self.fail_after_rows
            && self.position >= limit
        {
            return Err(BackupError::query("fetching rows", "transport-level error"));
        }

        let mut end = (self.position + max_rows).min(self.rows.len());
        if let Some(limit) = self.fail_after_rows {
            end = end.min(limit.max(self.position));
        }

        let chunk = self.rows[self.position..end].to_vec();
        self.position = end;

        let _ = self.stats.largest_chunk_returned.fetch_max(chunk.len(), Ordering::Relaxed);
        Ok(chunk)
    }
}
