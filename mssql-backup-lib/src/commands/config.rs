use crate::Result;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up in the current directory
pub const DEFAULT_CONFIG_FILE_NAME: &str = "mssql-backup.toml";

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory under which each server gets a directory of backup runs
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,

    /// Rows fetched per round trip while streaming a table
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How long a connection test waits for the server
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Whether each run starts by writing `schema.json`
    #[serde(default = "default_snapshot_schema")]
    pub snapshot_schema: bool,

    /// Maximum number of databases backed up at the same time
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Known servers
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// A server entry of the configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub name: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    /// Password stored in the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default = "default_trust_server_certificate")]
    pub trust_server_certificate: bool,

    /// Databases backed up when no database is named on the command line
    #[serde(default)]
    pub databases: Vec<String>,
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("backups")
}

const fn default_chunk_size() -> usize {
    crate::backup::DEFAULT_CHUNK_SIZE
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_snapshot_schema() -> bool {
    true
}

const fn default_max_concurrent_runs() -> usize {
    1
}

const fn default_port() -> u16 {
    crate::db::DEFAULT_PORT
}

const fn default_trust_server_certificate() -> bool {
    true
}

impl ServerConfig {
    /// The password from the file, or else from the configured environment variable
    ///
    /// # Errors
    ///
    /// Returns an error if neither source provides a password
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }

        if let Some(var) = &self.password_env {
            return std::env::var(var).into_app_err_with(|| format!("reading password of server '{}' from ${var}", self.name));
        }

        Err(app_err!(
            "no password for server '{}': set `password` or `password_env`, or use --password",
            self.name
        ))
    }
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `mssql-backup.toml` in the current directory is used when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{}'", path.display()))?;
            (path.to_path_buf(), text)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // No config file found, use defaults
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{}'", path.display())),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{}'", final_path.display()))?;
        config.validate()?;

        log::debug!("Loaded configuration from '{}'", final_path.display());
        Ok(config)
    }

    /// Save the default configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default(output_path: &Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML)
            .into_app_err_with(|| format!("writing default configuration to {}", output_path.display()))?;
        Ok(())
    }

    /// Look up a server entry by name
    ///
    /// # Errors
    ///
    /// Returns an error if no server has that name
    pub fn server(&self, name: &str) -> Result<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name).ok_or_else(|| {
            let known: Vec<_> = self.servers.iter().map(|s| s.name.as_str()).collect();
            if known.is_empty() {
                app_err!("unknown server '{name}': the configuration defines no servers")
            } else {
                app_err!("unknown server '{name}', expected one of: {}", known.join(", "))
            }
        })
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if values are out of range or server names are empty or repeated
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(app_err!("chunk_size must be greater than 0"));
        }

        if self.max_concurrent_runs == 0 {
            return Err(app_err!("max_concurrent_runs must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(app_err!("server names must not be empty"));
            }

            if !seen.insert(server.name.as_str()) {
                return Err(app_err!("server '{}' is defined more than once", server.name));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
