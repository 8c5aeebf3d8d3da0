//! Arguments and setup shared by every command.

use super::Host;
use super::ProgressReporter;
use super::config::{Config, ServerConfig};
use crate::Result;
use crate::db::{ConnectionTarget, Credentials, DEFAULT_PORT};
use clap::{Args, ValueEnum};
use core::time::Duration;
use ohno::bail;
use std::io::IsTerminal;
use std::path::PathBuf;

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments accepted by every command
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file (default is `mssql-backup.toml` in the current directory)
    #[arg(long, short = 'c', value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

/// How to reach the server a command talks to
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Name of a server defined in the configuration file
    #[arg(long, short = 's', value_name = "NAME")]
    pub server: Option<String>,

    /// Host name or address of the server (overrides the configured host)
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// TCP port of the server (overrides the configured port)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Login name for SQL Server authentication (overrides the configured username)
    #[arg(long, short = 'u', value_name = "USER")]
    pub username: Option<String>,

    /// Password for SQL Server authentication (overrides the configured password)
    #[arg(long, value_name = "PASSWORD", env = "MSSQL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// A server with every connection detail filled in.
#[derive(Debug, Clone)]
pub struct ResolvedServer {
    /// The configured name, or the host when the server was given on the command line
    pub name: String,

    pub target: ConnectionTarget,

    /// Databases configured for the server
    pub databases: Vec<String>,
}

impl ConnectionArgs {
    /// Combine the command line with the configuration, command-line values taking precedence.
    pub fn resolve(&self, config: &Config) -> Result<ResolvedServer> {
        let entry: Option<&ServerConfig> = match &self.server {
            Some(name) => Some(config.server(name)?),
            None => None,
        };

        let Some(host) = self.host.clone().or_else(|| entry.map(|e| e.host.clone())) else {
            bail!("no server specified: use --server NAME or --host HOST");
        };

        let Some(username) = self.username.clone().or_else(|| entry.map(|e| e.username.clone())) else {
            bail!("no username for server '{host}': use --username or set `username` in the configuration");
        };

        let password = match (&self.password, entry) {
            (Some(password), _) => password.clone(),
            (None, Some(entry)) => entry.resolve_password()?,
            (None, None) => bail!("no password for server '{host}': use --password or set MSSQL_PASSWORD"),
        };

        let port = self.port.or_else(|| entry.map(|e| e.port)).unwrap_or(DEFAULT_PORT);

        let mut target = ConnectionTarget::new(host.clone(), port, Credentials::new(username, password));
        target.trust_server_certificate = entry.is_none_or(|e| e.trust_server_certificate);

        Ok(ResolvedServer {
            name: self.server.clone().unwrap_or(host),
            target,
            databases: entry.map(|e| e.databases.clone()).unwrap_or_default(),
        })
    }
}

/// Logging, configuration, and output settings for one command invocation.
#[derive(Debug)]
pub struct Common<'a, H: Host> {
    pub host: &'a mut H,
    pub config: Config,
    log_level: LogLevel,
    color: ColorMode,
}

impl<'a, H: Host> Common<'a, H> {
    /// Initialize logging and load the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or is invalid
    pub fn new(host: &'a mut H, args: &CommonArgs) -> Result<Self> {
        Self::init_logging(args.log_level);
        let config = Config::load(args.config.as_deref())?;

        Ok(Self {
            host,
            config,
            log_level: args.log_level,
            color: args.color,
        })
    }

    /// Initialize logger based on log level
    fn init_logging(log_level: LogLevel) {
        let level = match log_level {
            LogLevel::None => return,
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        let env = env_logger::Env::default().filter_or("RUST_LOG", level);

        // a second command in the same process keeps the first logger
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
            .try_init();
    }

    /// A progress bar that stays out of the way of log output.
    pub fn progress_reporter(&self) -> ProgressReporter {
        let delay = if self.log_level == LogLevel::None {
            Duration::from_millis(300)
        } else {
            Duration::from_hours(365 * 24)
        };

        let use_colors = match self.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stderr().is_terminal(),
        };

        ProgressReporter::new(delay, use_colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        toml::from_str(
            r#"
[[servers]]
name = "prod"
host = "db01.corp"
port = 14330
username = "backup"
password = "from-config"
trust_server_certificate = false
databases = ["Sales", "Inventory"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_from_config() {
        let args = ConnectionArgs {
            server: Some("prod".into()),
            ..ConnectionArgs::default()
        };

        let server = args.resolve(&config()).unwrap();
        assert_eq!(server.name, "prod");
        assert_eq!(server.target.host, "db01.corp");
        assert_eq!(server.target.port, 14330);
        assert_eq!(server.target.credentials.username, "backup");
        assert_eq!(server.target.credentials.password(), "from-config");
        assert!(!server.target.trust_server_certificate);
        assert_eq!(server.databases, vec!["Sales".to_string(), "Inventory".to_string()]);
    }

    #[test]
    fn test_flags_override_config() {
        let args = ConnectionArgs {
            server: Some("prod".into()),
            host: Some("db02.corp".into()),
            port: Some(1500),
            username: Some("sa".into()),
            password: Some("from-flag".into()),
        };

        let server = args.resolve(&config()).unwrap();
        assert_eq!(server.name, "prod");
        assert_eq!(server.target.host, "db02.corp");
        assert_eq!(server.target.port, 1500);
        assert_eq!(server.target.credentials.username, "sa");
        assert_eq!(server.target.credentials.password(), "from-flag");
    }

    #[test]
    fn test_ad_hoc_server() {
        let args = ConnectionArgs {
            host: Some("localhost".into()),
            username: Some("sa".into()),
            password: Some("pw".into()),
            ..ConnectionArgs::default()
        };

        let server = args.resolve(&Config::default()).unwrap();
        assert_eq!(server.name, "localhost");
        assert_eq!(server.target.port, DEFAULT_PORT);
        assert!(server.target.trust_server_certificate);
        assert!(server.databases.is_empty());
    }

    #[test]
    fn test_missing_details_are_errors() {
        let none = ConnectionArgs::default();
        assert!(none.resolve(&Config::default()).is_err());

        let no_password = ConnectionArgs {
            host: Some("localhost".into()),
            username: Some("sa".into()),
            ..ConnectionArgs::default()
        };
        assert!(no_password.resolve(&Config::default()).is_err());

        let unknown = ConnectionArgs {
            server: Some("nope".into()),
            ..ConnectionArgs::default()
        };
        assert!(unknown.resolve(&config()).is_err());
    }
}
