//! Command dispatch logic for mssql-backup

use super::common::{CommonArgs, ConnectionArgs};
use super::{
    BackupArgs, InitArgs, TablesArgs, VerifyArgs, init_config, list_databases, list_tables, process_backup, test_connection, verify_backup,
};
use crate::db::{Connector, MssqlConnector};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "mssql-backup", version, author, long_about = None)]
#[command(about = "Stream SQL Server tables into compressed JSON backups")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a server accepts the configured credentials
    TestConnection(ConnectionArgs),
    /// List the online user databases of a server
    Databases(ConnectionArgs),
    /// List the base tables of a database
    Tables(TablesArgs),
    /// Back up one or more databases
    Backup(Box<BackupArgs>),
    /// Check a backup run directory against its manifest
    Verify(VerifyArgs),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// This function parses the command-line arguments and executes the corresponding
/// subcommand against a real SQL Server. It's designed to be called from main.rs with
/// the program arguments.
///
/// # Errors
///
/// Returns an error if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    run_with(host, &MssqlConnector::new(), args).await
}

/// Like [`run`], but talks to servers through `connector`.
///
/// # Errors
///
/// Returns an error if the executed command fails
pub async fn run_with<I, T, H, C>(host: &mut H, connector: &C, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
    C: Connector,
{
    let cli = Cli::parse_from(args);
    let common = &cli.common;

    match &cli.command {
        Command::TestConnection(args) => test_connection(host, connector, common, args).await,
        Command::Databases(args) => list_databases(host, connector, common, args).await,
        Command::Tables(args) => list_tables(host, connector, common, args).await,
        Command::Backup(args) => process_backup(host, connector, common, args).await,
        Command::Verify(args) => verify_backup(host, common, args),
        Command::Init(args) => init_config(host, args),
    }
}
