use super::Host;
use super::common::{Common, CommonArgs, ConnectionArgs};
use crate::Result;
use crate::backup::{BackupError, BackupOptions, ProgressSink, RunSummary, run_backup};
use crate::db::{self, Connector, catalog::MASTER_DATABASE, sanitize_file_name};
use clap::Parser;
use futures::StreamExt;
use futures::stream;
use ohno::{IntoAppError, bail};
use std::io::Write;
use std::path::PathBuf;

const LOG_TARGET: &str = "  commands";

#[derive(Parser, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Database to back up, may be repeated (default is the server's configured databases)
    #[arg(long, short = 'd', value_name = "NAME")]
    pub database: Vec<String>,

    /// Back up every online user database on the server
    #[arg(long, conflicts_with = "database")]
    pub all_databases: bool,

    /// Directory under which backups are written (overrides `backup_root`)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Maximum number of databases backed up at the same time (overrides `max_concurrent_runs`)
    #[arg(long, short = 'j', value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: Option<u16>,

    /// Rows fetched per round trip (overrides `chunk_size`)
    #[arg(long, value_name = "ROWS", value_parser = clap::value_parser!(u32).range(1..))]
    pub chunk_size: Option<u32>,

    /// Skip writing `schema.json`
    #[arg(long)]
    pub no_schema: bool,

    /// Exit with an error if any table could not be backed up
    #[arg(long)]
    pub fail_on_table_error: bool,
}

pub async fn process_backup<H: Host, C: Connector>(host: &mut H, connector: &C, common: &CommonArgs, args: &BackupArgs) -> Result<()> {
    let mut common = Common::new(host, common)?;
    let server = args.connection.resolve(&common.config)?;

    let databases = if args.all_databases {
        let mut session = connector
            .connect(&server.target, MASTER_DATABASE)
            .await
            .into_app_err_with(|| format!("connecting to server '{}'", server.name))?;
        db::list_databases(&mut session)
            .await
            .into_app_err_with(|| format!("listing databases on server '{}'", server.name))?
    } else if args.database.is_empty() {
        server.databases.clone()
    } else {
        args.database.clone()
    };

    if databases.is_empty() {
        bail!(
            "nothing to back up on server '{}': use --database or --all-databases, or set `databases` in the configuration",
            server.name
        );
    }

    let output_root = args
        .output
        .clone()
        .unwrap_or_else(|| common.config.backup_root.clone())
        .join(sanitize_file_name(&server.name));

    let options = BackupOptions {
        chunk_size: args.chunk_size.map_or(common.config.chunk_size, |n| n as usize),
        snapshot_schema: common.config.snapshot_schema && !args.no_schema,
    };

    let jobs = args.jobs.map_or(common.config.max_concurrent_runs, usize::from);

    log::info!(
        target: LOG_TARGET,
        "Backing up {} database(s) from '{}' into {} with up to {jobs} at a time",
        databases.len(),
        server.name,
        output_root.display()
    );

    let reporter = common.progress_reporter();
    reporter.set_phase("Backing up");

    let target = &server.target;
    let output_root = output_root.as_path();
    let options = &options;
    let sink: &dyn ProgressSink = &reporter;

    let mut results: Vec<(String, Result<RunSummary, BackupError>)> = stream::iter(databases)
        .map(|database| async move {
            let result = run_backup(connector, target.clone(), &database, output_root, options, Some(sink)).await;
            (database, result)
        })
        .buffer_unordered(jobs.max(1))
        .collect()
        .await;

    reporter.done();
    results.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut failed_runs = 0;
    let mut failed_tables = 0;

    for (database, result) in &results {
        match result {
            Ok(summary) => {
                let failed = summary.manifest.failed().count();
                failed_tables += failed;

                let _ = writeln!(
                    common.host.output(),
                    "{database}: {} of {} table(s) backed up, {} byte(s) in {}",
                    summary.manifest.tables_count - failed,
                    summary.manifest.tables_count,
                    summary.total_bytes,
                    summary.run_dir.display()
                );

                for table in summary.manifest.failed() {
                    let _ = writeln!(
                        common.host.error(),
                        "  {}: {}",
                        table.id,
                        table.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }

            Err(e) => {
                failed_runs += 1;
                let _ = writeln!(common.host.error(), "{database}: backup failed: {e}");
            }
        }
    }

    if failed_runs > 0 {
        bail!("{failed_runs} of {} database backup(s) failed", results.len());
    }

    if args.fail_on_table_error && failed_tables > 0 {
        bail!("{failed_tables} table(s) could not be backed up");
    }

    Ok(())
}
