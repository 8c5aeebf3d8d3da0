use super::document;
use super::error::BackupError;
use crate::db::Session;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const LOG_TARGET: &str = "    schema";

/// File name of the schema snapshot inside a run directory.
pub const SCHEMA_FILE_NAME: &str = "schema.json";

/// Catalog metadata for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    #[serde(rename = "type")]
    pub data_type: String,

    pub nullable: bool,

    pub default: Option<String>,

    pub max_length: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
}

/// Column lists of every base table, keyed by `"schema.table"`.
///
/// Keys are kept sorted and the snapshot carries no timestamp, so snapshotting an unchanged
/// database always produces the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaSnapshot {
    /// Read the column catalog in a single pass.
    pub async fn capture<S: Session + ?Sized>(session: &mut S) -> Result<Self, BackupError> {
        let mut snapshot = Self::default();

        for (table, column) in session.column_catalog().await? {
            snapshot.tables.entry(table.to_string()).or_default().columns.push(column);
        }

        Ok(snapshot)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Capture the schema of the session's database and write it to `output`.
pub async fn snapshot_schema<S: Session + ?Sized>(session: &mut S, output: &Path) -> Result<SchemaSnapshot, BackupError> {
    let snapshot = SchemaSnapshot::capture(session).await?;
    let _ = document::save(&snapshot, output)?;
    log::info!(target: LOG_TARGET, "Captured schema of {} table(s) to {}", snapshot.len(), output.display());
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::{FakeServer, FakeTable};
    use crate::db::{ConnectionTarget, Connector, Credentials, DEFAULT_PORT};
    use std::fs;

    fn target() -> ConnectionTarget {
        ConnectionTarget::new("fake", DEFAULT_PORT, Credentials::new("sa", "pw"))
    }

    fn server() -> FakeServer {
        FakeServer::new().with_database(
            "Sales",
            vec![
                FakeTable::new("dbo", "Orders").column("Id", "int").column("PlacedAt", "datetime2"),
                FakeTable::new("dbo", "Customers").column("Id", "int").column("Name", "nvarchar"),
            ],
        )
    }

    #[tokio::test]
    async fn test_capture_groups_columns_by_table() {
        let mut session = server().connect(&target(), "Sales").await.unwrap();
        let snapshot = SchemaSnapshot::capture(&mut session).await.unwrap();

        assert_eq!(snapshot.len(), 2);
        let orders = &snapshot.tables["dbo.Orders"];
        let names: Vec<_> = orders.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "PlacedAt"]);
        assert_eq!(orders.columns[1].data_type, "datetime2");
    }

    #[tokio::test]
    async fn test_snapshot_document_shape() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SCHEMA_FILE_NAME);
        let mut session = server().connect(&target(), "Sales").await.unwrap();

        let _ = snapshot_schema(&mut session, &path).await.unwrap();

        let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let column = &doc["dbo.Customers"]["columns"][1];
        assert_eq!(column["name"], "Name");
        assert_eq!(column["type"], "nvarchar");
        assert_eq!(column["nullable"], true);
        assert!(column["default"].is_null());
        assert!(column["max_length"].is_null());
    }

    #[tokio::test]
    async fn test_snapshot_is_byte_identical_across_runs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = temp_dir.path().join("first.json");
        let second = temp_dir.path().join("second.json");
        let server = server();

        let mut session = server.connect(&target(), "Sales").await.unwrap();
        let _ = snapshot_schema(&mut session, &first).await.unwrap();
        let mut session = server.connect(&target(), "Sales").await.unwrap();
        let _ = snapshot_schema(&mut session, &second).await.unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[tokio::test]
    async fn test_catalog_failure_propagates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SCHEMA_FILE_NAME);
        let mut session = server().failing_column_catalog().connect(&target(), "Sales").await.unwrap();

        let err = snapshot_schema(&mut session, &path).await.unwrap_err();
        assert!(err.is_query());
        assert!(!path.exists());
    }
}
