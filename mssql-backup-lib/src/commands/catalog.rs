//! Commands that browse a server: `test-connection`, `databases`, and `tables`.

use super::Host;
use super::common::{Common, CommonArgs, ConnectionArgs};
use crate::Result;
use crate::db::{self, Connector, catalog::MASTER_DATABASE};
use clap::Parser;
use ohno::{IntoAppError, bail};
use std::io::Write;

#[derive(Parser, Debug)]
pub struct TablesArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Database whose tables to list
    #[arg(long, short = 'd', value_name = "NAME")]
    pub database: String,
}

pub async fn test_connection<H: Host, C: Connector>(host: &mut H, connector: &C, common: &CommonArgs, args: &ConnectionArgs) -> Result<()> {
    let mut common = Common::new(host, common)?;
    let server = args.resolve(&common.config)?;

    let status = db::test_connection(connector, &server.target, common.config.connect_timeout).await;
    if status.success {
        let _ = writeln!(common.host.output(), "{} ({}): {}", server.name, server.target, status.message);
        Ok(())
    } else {
        let _ = writeln!(common.host.error(), "{} ({}): {}", server.name, server.target, status.message);
        bail!("connection test failed");
    }
}

pub async fn list_databases<H: Host, C: Connector>(host: &mut H, connector: &C, common: &CommonArgs, args: &ConnectionArgs) -> Result<()> {
    let mut common = Common::new(host, common)?;
    let server = args.resolve(&common.config)?;

    let mut session = connector
        .connect(&server.target, MASTER_DATABASE)
        .await
        .into_app_err_with(|| format!("connecting to server '{}'", server.name))?;
    let names = db::list_databases(&mut session)
        .await
        .into_app_err_with(|| format!("listing databases on server '{}'", server.name))?;

    let mut out = common.host.output();
    for name in names {
        let _ = writeln!(out, "{name}");
    }

    Ok(())
}

pub async fn list_tables<H: Host, C: Connector>(host: &mut H, connector: &C, common: &CommonArgs, args: &TablesArgs) -> Result<()> {
    let mut common = Common::new(host, common)?;
    let server = args.connection.resolve(&common.config)?;

    let mut session = connector
        .connect(&server.target, &args.database)
        .await
        .into_app_err_with(|| format!("connecting to database '{}' on server '{}'", args.database, server.name))?;
    let tables = db::list_tables(&mut session)
        .await
        .into_app_err_with(|| format!("listing tables of database '{}'", args.database))?;

    let mut out = common.host.output();
    for table in tables {
        let _ = writeln!(out, "{table}");
    }

    Ok(())
}
