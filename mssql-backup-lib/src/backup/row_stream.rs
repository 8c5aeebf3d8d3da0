use super::error::BackupError;
use super::value::normalize;
use crate::db::{Row, RowCursor};
use core::fmt::{Debug, Formatter, Result as FmtResult};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;
use std::vec::IntoIter;

const LOG_TARGET: &str = "row_stream";

/// Number of rows fetched per round trip unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// A normalized row: every column maps to text or null, in source column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl Record {
    /// Pair `row` positionally with `columns`, normalizing each cell.
    #[must_use]
    pub fn from_row(columns: &Arc<[String]>, row: Row) -> Self {
        Self {
            columns: Arc::clone(columns),
            values: row.into_iter().take(columns.len()).map(normalize).collect(),
        }
    }

    /// The value of `column`, or `None` when the record has no such column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.iter().find(|(name, _)| *name == column).map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter().map(Option::as_deref))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Pulls rows from a cursor one chunk at a time and hands them out as [`Record`]s.
///
/// At most one chunk is held in memory. The stream is single pass: once it reports the end,
/// the underlying cursor is exhausted.
pub struct RowStream<'c, C: RowCursor + ?Sized> {
    cursor: &'c mut C,
    columns: Arc<[String]>,
    chunk_size: usize,
    chunk: IntoIter<Row>,
    chunks_fetched: u64,
    exhausted: bool,
}

impl<'c, C: RowCursor + ?Sized> RowStream<'c, C> {
    /// Create a stream over `cursor`. A `chunk_size` of zero is treated as one.
    pub fn new(cursor: &'c mut C, columns: impl Into<Arc<[String]>>, chunk_size: usize) -> Self {
        Self {
            cursor,
            columns: columns.into(),
            chunk_size: chunk_size.max(1),
            chunk: Vec::new().into_iter(),
            chunks_fetched: 0,
            exhausted: false,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The next record, or `None` once the cursor has no more rows.
    pub async fn next_record(&mut self) -> Result<Option<Record>, BackupError> {
        loop {
            if let Some(row) = self.chunk.next() {
                return Ok(Some(Record::from_row(&self.columns, row)));
            }

            if self.exhausted {
                return Ok(None);
            }

            let chunk = self.cursor.next_chunk(self.chunk_size).await?;
            if chunk.is_empty() {
                log::debug!(target: LOG_TARGET, "Cursor exhausted after {} chunk(s)", self.chunks_fetched);
                self.exhausted = true;
            } else {
                self.chunks_fetched += 1;
                self.chunk = chunk.into_iter();
            }
        }
    }
}

impl<C: RowCursor + ?Sized> Debug for RowStream<'_, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RowStream")
            .field("columns", &self.columns)
            .field("chunk_size", &self.chunk_size)
            .field("buffered", &self.chunk.len())
            .field("chunks_fetched", &self.chunks_fetched)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::SqlValue;
    use crate::db::fake::{FakeServer, FakeTable};
    use crate::db::{ConnectionTarget, Connector, Credentials, DEFAULT_PORT, Session, TableId};
    use core::sync::atomic::Ordering;

    fn target() -> ConnectionTarget {
        ConnectionTarget::new("fake", DEFAULT_PORT, Credentials::new("sa", "pw"))
    }

    fn columns(names: &[&str]) -> Arc<[String]> {
        names.iter().map(ToString::to_string).collect()
    }

    async fn count_records(rows: usize, chunk_size: usize) -> (u64, FakeServer) {
        let server = FakeServer::new().with_database("db", vec![FakeTable::new("dbo", "t").column("a", "int").text_rows(rows)]);
        let mut session = server.connect(&target(), "db").await.unwrap();
        let mut cursor = session.open_table(&TableId::new("dbo", "t")).await.unwrap();
        let mut stream = RowStream::new(&mut cursor, columns(&["a"]), chunk_size);

        let mut count = 0;
        while stream.next_record().await.unwrap().is_some() {
            count += 1;
        }

        assert!(stream.next_record().await.unwrap().is_none(), "stream must stay exhausted");
        (count, server)
    }

    #[tokio::test]
    async fn test_record_count_is_independent_of_chunk_size() {
        for rows in [0, 1, 7, 1000, 2500] {
            for chunk_size in [1, 3, 1000, 5000] {
                let (count, _) = count_records(rows, chunk_size).await;
                assert_eq!(count, rows as u64, "rows={rows} chunk_size={chunk_size}");
            }
        }
    }

    #[tokio::test]
    async fn test_never_requests_more_than_chunk_size() {
        let (_, server) = count_records(2500, 1000).await;
        assert_eq!(server.stats.largest_chunk_requested.load(Ordering::Relaxed), 1000);
        assert_eq!(server.stats.largest_chunk_returned.load(Ordering::Relaxed), 1000);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_clamped() {
        let (count, server) = count_records(3, 0).await;
        assert_eq!(count, 3);
        assert_eq!(server.stats.largest_chunk_requested.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_cursor_failure_propagates() {
        let server = FakeServer::new().with_database(
            "db",
            vec![FakeTable::new("dbo", "t").column("a", "int").text_rows(10).failing_after(4)],
        );
        let mut session = server.connect(&target(), "db").await.unwrap();
        let mut cursor = session.open_table(&TableId::new("dbo", "t")).await.unwrap();
        let mut stream = RowStream::new(&mut cursor, columns(&["a"]), 3);

        let mut seen = 0;
        let err = loop {
            match stream.next_record().await {
                Ok(Some(_)) => seen += 1,
                Ok(None) => panic!("expected a failure"),
                Err(e) => break e,
            }
        };

        assert_eq!(seen, 4);
        assert!(err.is_query());
    }

    #[test]
    fn test_record_zips_columns_with_values() {
        let record = Record::from_row(
            &columns(&["id", "note", "at"]),
            vec![
                SqlValue::Text("1".into()),
                SqlValue::Null,
                SqlValue::temporal(chrono::NaiveDate::from_ymd_opt(2024, 1, 2)),
            ],
        );

        assert_eq!(record.len(), 3);
        assert_eq!(record.get("id"), Some(Some("1")));
        assert_eq!(record.get("note"), Some(None));
        assert_eq!(record.get("at"), Some(Some("2024-01-02")));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_record_serializes_in_column_order() {
        let record = Record::from_row(
            &columns(&["zeta", "alpha", "mid"]),
            vec![SqlValue::Text("z".into()), SqlValue::Null, SqlValue::Text("m\"q".into())],
        );

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"zeta":"z","alpha":null,"mid":"m\"q"}"#);
    }
}
