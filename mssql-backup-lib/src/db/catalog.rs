//! Catalog discovery: what databases and tables a server exposes.

use super::{ConnectionTarget, Connector, Session, TableId};
use crate::backup::BackupError;
use core::time::Duration;
use serde::Serialize;

const LOG_TARGET: &str = "   catalog";

/// Databases every SQL Server instance ships with.
const SYSTEM_DATABASES: &[&str] = &["master", "tempdb", "model", "msdb"];

/// System databases occupy the first four database ids.
const MAX_SYSTEM_DATABASE_ID: i32 = 4;

/// The database used for server-level operations.
pub const MASTER_DATABASE: &str = "master";

/// A database as reported by the server catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub database_id: i32,
    pub online: bool,
}

impl DatabaseInfo {
    fn is_system(&self) -> bool {
        self.database_id <= MAX_SYSTEM_DATABASE_ID || SYSTEM_DATABASES.iter().any(|s| s.eq_ignore_ascii_case(&self.name))
    }
}

/// Result of a connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

/// Base tables of the session's database, ordered by (schema, table).
pub async fn list_tables<S: Session + ?Sized>(session: &mut S) -> Result<Vec<TableId>, BackupError> {
    let mut tables = session.list_tables().await?;
    tables.sort();
    log::debug!(target: LOG_TARGET, "Found {} base table(s)", tables.len());
    Ok(tables)
}

/// Names of the user databases that are online, sorted by name.
pub async fn list_databases<S: Session + ?Sized>(session: &mut S) -> Result<Vec<String>, BackupError> {
    let mut names: Vec<_> = session
        .list_databases()
        .await?
        .into_iter()
        .filter(|db| {
            if db.is_system() {
                return false;
            }

            if !db.online {
                log::debug!(target: LOG_TARGET, "Skipping database '{}' because it is not online", db.name);
                return false;
            }

            true
        })
        .map(|db| db.name)
        .collect();

    names.sort();
    Ok(names)
}

/// Open a connection to `master` and close it again, giving up after `timeout`.
///
/// This never fails: problems are reported through the returned status.
pub async fn test_connection<C: Connector + ?Sized>(connector: &C, target: &ConnectionTarget, timeout: Duration) -> ConnectionStatus {
    log::debug!(target: LOG_TARGET, "Testing connection to {target}");

    match tokio::time::timeout(timeout, connector.connect(target, MASTER_DATABASE)).await {
        Ok(Ok(session)) => {
            drop(session);
            ConnectionStatus {
                success: true,
                message: "Connection successful".to_string(),
            }
        }
        Ok(Err(e)) => ConnectionStatus {
            success: false,
            message: e.to_string(),
        },
        Err(_) => ConnectionStatus {
            success: false,
            message: format!("timed out after {}s connecting to {target}", timeout.as_secs_f64()),
        },
    }
}
