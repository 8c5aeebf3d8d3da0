//! SQL Server access through `tiberius`.

use super::{ConnectionTarget, Connector, DatabaseInfo, Row, RowCursor, Session, TableId, quote_ident};
use crate::backup::{BackupError, ColumnDescriptor, SqlValue, Temporal};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use core::fmt::{Debug, Formatter, Result as FmtResult};
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

const LOG_TARGET: &str = "     mssql";

const APPLICATION_NAME: &str = "mssql-backup";

const LIST_TABLES_SQL: &str = "\
SELECT TABLE_SCHEMA, TABLE_NAME
FROM INFORMATION_SCHEMA.TABLES
WHERE TABLE_TYPE = 'BASE TABLE'";

const LIST_DATABASES_SQL: &str = "\
SELECT name, database_id, state_desc
FROM sys.databases";

const COLUMN_CATALOG_SQL: &str = "\
SELECT c.TABLE_SCHEMA, c.TABLE_NAME, c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, c.COLUMN_DEFAULT, c.CHARACTER_MAXIMUM_LENGTH
FROM INFORMATION_SCHEMA.COLUMNS c
JOIN INFORMATION_SCHEMA.TABLES t
  ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
WHERE t.TABLE_TYPE = 'BASE TABLE'
ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION";

const SOURCE_COLUMNS_SQL: &str = "\
SELECT c.name, TYPE_NAME(c.system_type_id), t.is_assembly_type
FROM sys.columns c
JOIN sys.types t ON t.user_type_id = c.user_type_id
WHERE c.object_id = OBJECT_ID(@P1)
ORDER BY c.column_id";

const ONLINE_STATE: &str = "ONLINE";

type TdsClient = Client<Compat<TcpStream>>;

/// Opens TDS connections to SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

impl MssqlConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn config_for(target: &ConnectionTarget, database: &str) -> Config {
    let mut config = Config::new();
    config.host(&target.host);
    config.port(target.port);
    config.database(database);
    config.application_name(APPLICATION_NAME);
    config.authentication(AuthMethod::sql_server(&target.credentials.username, target.credentials.password()));
    if target.trust_server_certificate {
        config.trust_cert();
    }
    config
}

async fn open_client(config: Config, context: &str) -> Result<TdsClient, tiberius::error::Error> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),

        // Azure SQL and availability groups may redirect the login to another node
        Err(tiberius::error::Error::Routing { host, port }) => {
            log::debug!(target: LOG_TARGET, "Login to {context} routed to {host}:{port}");
            let mut config = config;
            config.host(&host);
            config.port(port);

            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Client::connect(config, tcp.compat_write()).await
        }

        Err(e) => Err(e),
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    type Session = MssqlSession;

    async fn connect(&self, target: &ConnectionTarget, database: &str) -> Result<MssqlSession, BackupError> {
        let context = format!("{target}/{database}");
        log::debug!(target: LOG_TARGET, "Connecting to {context} as '{}'", target.credentials.username);

        let client = open_client(config_for(target, database), &context)
            .await
            .map_err(|e| BackupError::connection(context.clone(), e))?;

        Ok(MssqlSession { client, context })
    }
}

/// An open TDS connection.
pub struct MssqlSession {
    client: TdsClient,
    context: String,
}

impl Debug for MssqlSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MssqlSession")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl MssqlSession {
    async fn query_rows(&mut self, sql: &str, what: &str) -> Result<Vec<tiberius::Row>, BackupError> {
        let query_error = |e: tiberius::error::Error| BackupError::query(format!("{what} on {}", self.context), e);

        let stream = self.client.simple_query(sql).await.map_err(query_error)?;
        stream.into_first_result().await.map_err(query_error)
    }

    /// The select list reading every column of `table`, in declaration order.
    async fn table_select_list(&mut self, table: &TableId) -> Result<String, BackupError> {
        let query_error = |e: tiberius::error::Error| BackupError::query(format!("reading columns of {table}"), e);

        let name = table.quoted();
        let rows = self
            .client
            .query(SOURCE_COLUMNS_SQL, &[&name.as_str()])
            .await
            .map_err(query_error)?
            .into_first_result()
            .await
            .map_err(query_error)?;

        let columns = rows
            .iter()
            .map(|row| {
                Ok(SourceColumn {
                    name: require_str(row, 0)?,
                    base_type: get_str(row, 1)?,
                    is_assembly_type: row.try_get::<bool, _>(2)?.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, tiberius::error::Error>>()
            .map_err(query_error)?;

        if columns.is_empty() {
            return Err(BackupError::query(format!("reading columns of {table}"), "table does not exist or is not visible"));
        }

        Ok(select_list(&columns))
    }
}

/// A column of a table as the select list needs to see it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceColumn {
    name: String,

    /// The built-in type the column is stored as; unset for CLR types.
    base_type: Option<String>,

    /// `hierarchyid`, `geography`, `geometry`, and user CLR types.
    is_assembly_type: bool,
}

/// The expression that reads `column` in a form the driver can decode.
///
/// The driver cannot decode CLR types or `sql_variant` at all, and reads `money` as a float. Those
/// columns are converted on the server and keep their name through an alias.
fn select_expression(column: &SourceColumn) -> String {
    let ident = quote_ident(&column.name);

    let converted = if column.is_assembly_type {
        format!("{ident}.ToString()")
    } else {
        match column.base_type.as_deref() {
            Some("sql_variant") => format!("CAST({ident} AS nvarchar(4000))"),
            Some("money") => format!("CAST({ident} AS decimal(19, 4))"),
            Some("smallmoney") => format!("CAST({ident} AS decimal(10, 4))"),
            _ => return ident,
        }
    };

    format!("{converted} AS {ident}")
}

fn select_list(columns: &[SourceColumn]) -> String {
    columns.iter().map(select_expression).collect::<Vec<_>>().join(", ")
}

fn get_str(row: &tiberius::Row, index: usize) -> Result<Option<String>, tiberius::error::Error> {
    Ok(row.try_get::<&str, _>(index)?.map(ToString::to_string))
}

fn require_str(row: &tiberius::Row, index: usize) -> Result<String, tiberius::error::Error> {
    get_str(row, index)?.ok_or_else(|| tiberius::error::Error::Conversion(format!("unexpected NULL in column {index}").into()))
}

#[async_trait]
impl Session for MssqlSession {
    type Cursor<'a> = MssqlCursor<'a>;

    async fn list_tables(&mut self) -> Result<Vec<TableId>, BackupError> {
        let rows = self.query_rows(LIST_TABLES_SQL, "listing tables").await?;

        rows.iter()
            .map(|row| Ok(TableId::new(require_str(row, 0)?, require_str(row, 1)?)))
            .collect::<Result<_, tiberius::error::Error>>()
            .map_err(|e| BackupError::query(format!("reading table list of {}", self.context), e))
    }

    async fn list_databases(&mut self) -> Result<Vec<DatabaseInfo>, BackupError> {
        let rows = self.query_rows(LIST_DATABASES_SQL, "listing databases").await?;

        rows.iter()
            .map(|row| {
                Ok(DatabaseInfo {
                    name: require_str(row, 0)?,
                    database_id: row.try_get::<i32, _>(1)?.unwrap_or_default(),
                    online: get_str(row, 2)?.is_some_and(|state| state == ONLINE_STATE),
                })
            })
            .collect::<Result<_, tiberius::error::Error>>()
            .map_err(|e| BackupError::query(format!("reading database list of {}", self.context), e))
    }

    async fn column_catalog(&mut self) -> Result<Vec<(TableId, ColumnDescriptor)>, BackupError> {
        let rows = self.query_rows(COLUMN_CATALOG_SQL, "reading column catalog").await?;

        rows.iter()
            .map(|row| {
                let table = TableId::new(require_str(row, 0)?, require_str(row, 1)?);
                let column = ColumnDescriptor {
                    name: require_str(row, 2)?,
                    data_type: require_str(row, 3)?,
                    nullable: get_str(row, 4)?.is_some_and(|v| v.eq_ignore_ascii_case("YES")),
                    default: get_str(row, 5)?,
                    max_length: row.try_get::<i32, _>(6)?,
                };
                Ok((table, column))
            })
            .collect::<Result<_, tiberius::error::Error>>()
            .map_err(|e| BackupError::query(format!("reading column catalog of {}", self.context), e))
    }

    async fn result_columns(&mut self, table: &TableId) -> Result<Vec<String>, BackupError> {
        let sql = format!("SELECT TOP 0 {} FROM {}", self.table_select_list(table).await?, table.quoted());
        let query_error = |e: tiberius::error::Error| BackupError::query(format!("reading the columns of {table}"), e);

        let mut stream = self.client.simple_query(sql).await.map_err(query_error)?;
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(query_error)?
            .map(|columns| columns.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        // the connection is unusable until the response is consumed
        let _ = stream.into_results().await.map_err(query_error)?;
        Ok(columns)
    }

    async fn open_table<'a>(&'a mut self, table: &TableId) -> Result<MssqlCursor<'a>, BackupError> {
        let sql = format!("SELECT {} FROM {}", self.table_select_list(table).await?, table.quoted());
        log::debug!(target: LOG_TARGET, "Opening {table} on {}", self.context);

        let stream = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| BackupError::query(format!("reading {table}"), e))?;

        Ok(MssqlCursor {
            rows: stream.into_row_stream(),
            table: table.to_string(),
        })
    }
}

/// Rows of a running full-table `SELECT`.
pub struct MssqlCursor<'a> {
    rows: BoxStream<'a, tiberius::Result<tiberius::Row>>,
    table: String,
}

impl Debug for MssqlCursor<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MssqlCursor").field("table", &self.table).finish_non_exhaustive()
    }
}

#[async_trait]
impl RowCursor for MssqlCursor<'_> {
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<Row>, BackupError> {
        let mut chunk = Vec::with_capacity(max_rows.min(4096));

        while chunk.len() < max_rows {
            let Some(row) = self
                .rows
                .try_next()
                .await
                .map_err(|e| BackupError::query(format!("reading {}", self.table), e))?
            else {
                break;
            };

            let row = row
                .into_iter()
                .map(decode_cell)
                .collect::<Result<Row, _>>()
                .map_err(|e| BackupError::query(format!("decoding a row of {}", self.table), e))?;

            chunk.push(row);
        }

        Ok(chunk)
    }
}

/// Decode a cell into the closed value set, using the type the server reported for its column.
fn decode_cell(data: ColumnData<'static>) -> tiberius::Result<SqlValue> {
    let value = match data {
        ColumnData::U8(v) => SqlValue::display(v),
        ColumnData::I16(v) => SqlValue::display(v),
        ColumnData::I32(v) => SqlValue::display(v),
        ColumnData::I64(v) => SqlValue::display(v),
        ColumnData::F32(v) => SqlValue::display(v),
        ColumnData::F64(v) => SqlValue::display(v),
        ColumnData::Bit(v) => SqlValue::display(v),
        ColumnData::Numeric(v) => SqlValue::display(v),
        ColumnData::Guid(v) => SqlValue::display(v),
        ColumnData::String(v) => SqlValue::display(v),
        ColumnData::Binary(v) => SqlValue::binary(v.as_deref()),
        ColumnData::Xml(v) => SqlValue::display(v.map(|xml| xml.into_owned().into_string())),
        ColumnData::Date(_) => temporal::<NaiveDate>(&data)?,
        ColumnData::Time(_) => temporal::<NaiveTime>(&data)?,
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => temporal::<NaiveDateTime>(&data)?,
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<FixedOffset>>(&data)?,
    };

    Ok(value)
}

fn temporal<'a, T>(data: &'a ColumnData<'static>) -> tiberius::Result<SqlValue>
where
    T: FromSql<'a> + Into<Temporal>,
{
    Ok(SqlValue::temporal(T::from_sql(data)?))
}
