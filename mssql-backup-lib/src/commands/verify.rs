use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::backup::verify_run;
use clap::Parser;
use ohno::{IntoAppError, bail};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Run directory to check, the one holding `backup_manifest.json`
    #[arg(value_name = "RUN_DIR")]
    pub run_dir: PathBuf,
}

pub fn verify_backup<H: Host>(host: &mut H, common: &CommonArgs, args: &VerifyArgs) -> Result<()> {
    let mut common = Common::new(host, common)?;

    let report = verify_run(&args.run_dir).into_app_err_with(|| format!("verifying '{}'", args.run_dir.display()))?;

    let mut out = common.host.output();
    let _ = writeln!(
        out,
        "{} ({}), {} table(s), {} byte(s)",
        report.manifest.database,
        report.manifest.backup_timestamp,
        report.manifest.tables_count,
        report.manifest.total_size
    );

    for (table, check) in &report.tables {
        let _ = writeln!(out, "  {table}: {check}");
    }

    if !report.total_size_consistent {
        let _ = writeln!(out, "  total_size does not match the sizes of the completed tables");
    }

    if !report.is_valid() {
        bail!("backup in '{}' failed verification", args.run_dir.display());
    }

    let _ = writeln!(out, "Backup is valid");
    Ok(())
}
