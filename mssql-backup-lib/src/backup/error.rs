use std::io;
use thiserror::Error;

type BoxedSource = Box<dyn core::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the backup engine.
///
/// The variant says where the failure happened, not how bad it is. Whether an error aborts a
/// whole run or only the table being archived is decided by the orchestrator.
#[derive(Debug, Error)]
pub enum BackupError {
    /// A connection could not be established or authenticated.
    #[error("unable to connect to {context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: BoxedSource,
    },

    /// A catalog or data query failed on an established connection.
    #[error("query failed while {context}: {source}")]
    Query {
        context: String,
        #[source]
        source: BoxedSource,
    },

    /// A local filesystem operation failed.
    #[error("i/o failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    pub fn connection(context: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Connection {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn query(context: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Query {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Adds a context string to `io::Result`s, turning them into [`BackupError::Io`].
pub trait IoContext<T> {
    fn io_context<F, S>(self, context: F) -> Result<T, BackupError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, context: F) -> Result<T, BackupError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| BackupError::io(context(), e))
    }
}
