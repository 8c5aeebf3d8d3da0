use super::Host;
use super::config::{Config, DEFAULT_CONFIG_FILE_NAME};
use crate::Result;
use clap::Parser;
use ohno::bail;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output configuration file path (default is `mssql-backup.toml` in the current directory)
    #[arg(value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn init_config<H: Host>(host: &mut H, args: &InitArgs) -> Result<()> {
    let output = args.output.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_NAME));

    if output.exists() && !args.force {
        bail!("'{}' already exists, use --force to overwrite it", output.display());
    }

    Config::save_default(&output)?;
    let _ = writeln!(host.output(), "Generated default configuration file: {}", output.display());
    Ok(())
}
