use crate::db::TableId;
use core::fmt::{Display, Formatter, Result as FmtResult};

/// Where a table is in its attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStage {
    Started,
    Archived { rows: u64, bytes: u64 },
    Failed,
}

/// A progress event for one table of a backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableProgress<'a> {
    /// The database whose run the table belongs to.
    pub database: &'a str,

    pub table: &'a TableId,

    /// One-based position of the table in the run.
    pub position: usize,

    pub total: usize,
    pub stage: TableStage,
}

impl Display for TableProgress<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let Self { table, position, total, .. } = self;

        match self.stage {
            TableStage::Started => write!(f, "Backing up {table} ({position}/{total})"),
            TableStage::Archived { rows, bytes } => write!(f, "Backed up {table} ({position}/{total}): {rows} row(s), {bytes} byte(s)"),
            TableStage::Failed => write!(f, "Failed to back up {table} ({position}/{total})"),
        }
    }
}

/// Observes a backup run, one event per table stage.
///
/// Notifications are purely informational; the run does not wait for anything from the sink.
pub trait ProgressSink: Send + Sync {
    fn table_progress(&self, event: &TableProgress<'_>);
}

impl<F> ProgressSink for F
where
    F: Fn(&TableProgress<'_>) + Send + Sync,
{
    fn table_progress(&self, event: &TableProgress<'_>) {
        self(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_started_message() {
        let table = TableId::new("dbo", "Orders");
        let event = TableProgress {
            database: "Sales",
            table: &table,
            position: 1,
            total: 2,
            stage: TableStage::Started,
        };

        assert_eq!(event.to_string(), "Backing up dbo.Orders (1/2)");
    }

    #[test]
    fn test_closure_is_a_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &TableProgress<'_>| seen.lock().unwrap().push(event.to_string());

        let table = TableId::new("dbo", "Customers");
        sink.table_progress(&TableProgress {
            database: "Sales",
            table: &table,
            position: 2,
            total: 2,
            stage: TableStage::Archived { rows: 0, bytes: 42 },
        });

        assert_eq!(seen.into_inner().unwrap(), vec!["Backed up dbo.Customers (2/2): 0 row(s), 42 byte(s)".to_string()]);
    }
}
