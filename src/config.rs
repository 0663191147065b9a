//! Pipeline configuration.
//!
//! Settings are read once from a TOML file and passed explicitly to the
//! catalog builder and the driver:
//!
//! ```toml
//! [cluster]
//! host = "dwh.abc123.us-west-2.redshift.amazonaws.com"
//! db_name = "dwh"
//! db_user = "dwhuser"
//! db_password = "secret"
//! port = 5439
//!
//! [s3]
//! log_data = "s3://udacity-dend/log_data"
//! log_jsonpath = "s3://udacity-dend/log_json_path.json"
//! song_data = "s3://udacity-dend/song_data"
//!
//! [iam_role]
//! arn = "arn:aws:iam::123456789012:role/dwhRole"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

use crate::error::{EtlError, EtlResult};

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "dwh.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SONGPLAY_ETL_CONFIG";

const APP_DIR: &str = "songplay-etl";

/// Complete pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EtlConfig {
    pub cluster: ClusterConfig,
    pub s3: S3Config,
    pub iam_role: IamRoleConfig,
}

/// Warehouse endpoint and credentials.
#[derive(Clone, Deserialize)]
pub struct ClusterConfig {
    pub host: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    5439
}

/// Source dataset locations.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Prefix holding the event log JSON files.
    pub log_data: String,
    /// JSONPaths file for the event logs, or `auto`.
    pub log_jsonpath: String,
    /// Prefix holding the song metadata JSON files.
    pub song_data: String,
}

/// Role the warehouse assumes to read the bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct IamRoleConfig {
    pub arn: String,
}

impl EtlConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> EtlResult<Self> {
        let config: EtlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_file(path: &Path) -> EtlResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Load the configuration from the first location that exists.
    pub fn load(explicit: Option<&Path>) -> EtlResult<Self> {
        let path = Self::locate(explicit)?;
        Self::from_file(&path)
    }

    /// Resolve the config file: explicit path, then `./dwh.toml`, then
    /// `<config dir>/songplay-etl/dwh.toml`.
    pub fn locate(explicit: Option<&Path>) -> EtlResult<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(EtlError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }

        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(APP_DIR).join(CONFIG_FILE_NAME));
        }

        candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .ok_or_else(|| {
                EtlError::Config(format!(
                    "{} not found. Use --config or set {}",
                    CONFIG_FILE_NAME, CONFIG_ENV_VAR
                ))
            })
    }

    /// Check every setting the pipeline consumes.
    pub fn validate(&self) -> EtlResult<()> {
        let c = &self.cluster;
        require("cluster.host", &c.host)?;
        require("cluster.db_name", &c.db_name)?;
        require("cluster.db_user", &c.db_user)?;
        require("cluster.db_password", &c.db_password)?;
        if c.port == 0 {
            return Err(EtlError::Config("cluster.port must be non-zero".into()));
        }

        require_s3("s3.log_data", &self.s3.log_data)?;
        require_s3("s3.song_data", &self.s3.song_data)?;
        if self.s3.log_jsonpath != "auto" {
            require_s3("s3.log_jsonpath", &self.s3.log_jsonpath)?;
        }

        require("iam_role.arn", &self.iam_role.arn)?;
        if !self.iam_role.arn.starts_with("arn:") {
            return Err(EtlError::Config(format!(
                "iam_role.arn must start with 'arn:', got '{}'",
                self.iam_role.arn
            )));
        }
        Ok(())
    }
}

/// Non-empty and safe to embed in a quoted SQL literal.
fn require(key: &str, value: &str) -> EtlResult<()> {
    if value.trim().is_empty() {
        return Err(EtlError::Config(format!("{} is missing or empty", key)));
    }
    if value.chars().any(|c| c == '\\' || c.is_control()) {
        return Err(EtlError::Config(format!(
            "{} contains a backslash or control character",
            key
        )));
    }
    Ok(())
}

fn require_s3(key: &str, value: &str) -> EtlResult<()> {
    require(key, value)?;
    if !value.starts_with("s3://") {
        return Err(EtlError::Config(format!(
            "{} must be an s3:// URI, got '{}'",
            key, value
        )));
    }
    Ok(())
}

impl ClusterConfig {
    /// Keyword/value connection string: `host=.. dbname=.. user=.. password=.. port=..`.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} dbname={} user={} password={} port={}",
            self.host, self.db_name, self.db_user, self.db_password, self.port
        )
    }

    /// [`connection_string`](Self::connection_string) with the password masked, for logs.
    pub fn redacted_connection_string(&self) -> String {
        let secret = format!(" password={} port=", self.db_password);
        self.connection_string()
            .replacen(&secret, " password=*** port=", 1)
    }

    /// Typed connect options for the PostgreSQL wire client.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.db_user)
            .password(&self.db_password)
            .database(&self.db_name)
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("host", &self.host)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"***")
            .field("port", &self.port)
            .finish()
    }
}
