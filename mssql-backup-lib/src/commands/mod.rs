//! Command-line interface for mssql-backup
//!
//! This module implements the CLI commands on top of the [`backup`](crate::backup) engine and
//! the [`db`](crate::db) access layer. It handles argument parsing, configuration management,
//! progress display, and turning engine results into exit status.
//!
//! ## Commands
//!
//! - **test-connection**: Open and close a connection to `master`, reporting the outcome
//! - **databases**: List the online user databases of a server
//! - **tables**: List the base tables of one database
//! - **backup**: Back up one or more databases, each into its own run directory. Several
//!   databases may be backed up at once; the tables of one database never are
//! - **verify**: Re-read a run directory and check every archive against the manifest
//! - **init**: Generate a default configuration file
//!
//! ## Execution Flow
//!
//! The `run` function parses command-line arguments using clap and routes to the appropriate
//! handler. Handlers that talk to a server are generic over [`Connector`](crate::db::Connector),
//! so `run_with` can drive them against any implementation. Each follows the same pattern:
//!
//! 1. Initialize logging and load configuration
//! 2. Resolve the server from `--server`, the connection flags, and the configuration
//! 3. Do the work, writing results to the host's output and problems to its error stream
//!
//! Configuration is a TOML file holding run defaults and named server entries.

mod backup;
mod catalog;
mod common;
mod config;
mod host;
mod init;
mod progress_reporter;
mod run;
mod verify;

pub use backup::{BackupArgs, process_backup};
pub use catalog::{TablesArgs, list_databases, list_tables, test_connection};
pub use common::{ColorMode, CommonArgs, ConnectionArgs, LogLevel, ResolvedServer};
pub use config::{Config, ServerConfig};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use run::{run, run_with};
pub use verify::{VerifyArgs, verify_backup};
