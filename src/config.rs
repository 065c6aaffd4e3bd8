use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;

/// File name of the configuration artifact written into the sandbox.
pub const SERVICE_CONFIG_FILE: &str = "authd.yaml";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Base directory scanned for versioned PostgreSQL installs.
    #[serde(default = "default_pg_base_dir")]
    pub pg_base_dir: PathBuf,
    /// Directory holding the service and migrator executables.
    #[serde(default = "default_binaries_dir")]
    pub binaries_dir: PathBuf,
    #[serde(default = "default_service_bin")]
    pub service_bin: String,
    /// Migrators run sequentially, each taking one connection string
    /// argument and exiting 0 on success.
    #[serde(default = "default_migrator_bins")]
    pub migrator_bins: Vec<String>,
    /// Environment variable the service reads its config directory from.
    #[serde(default = "default_config_dir_env")]
    pub config_dir_env: String,
    /// Environment variable the service reads its socket path from.
    #[serde(default = "default_socket_path_env")]
    pub socket_path_env: String,
    #[serde(default = "default_database_name")]
    pub database_name: String,
    #[serde(default = "default_database_user")]
    pub database_user: String,
    #[serde(default = "default_database_schema")]
    pub database_schema: String,
    /// Resource fetched over the service socket for the smoke assertion.
    #[serde(default = "default_smoke_path")]
    pub smoke_path: String,
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_pg_base_dir() -> PathBuf {
    PathBuf::from(crate::postgres::installation::DEFAULT_BASE_DIR)
}

fn default_binaries_dir() -> PathBuf {
    PathBuf::from("/usr/lib/authd")
}

fn default_service_bin() -> String {
    "authd".to_string()
}

fn default_migrator_bins() -> Vec<String> {
    vec![
        "authd-migrator".to_string(),
        "authd-app-migrator".to_string(),
    ]
}

fn default_config_dir_env() -> String {
    "AUTHD_CONFIG_DIR".to_string()
}

fn default_socket_path_env() -> String {
    "AUTHD_SOCKET_PATH".to_string()
}

fn default_database_name() -> String {
    "authz".to_string()
}

fn default_database_user() -> String {
    // initdb makes the invoking OS user the cluster superuser.
    whoami::username()
}

fn default_database_schema() -> String {
    "authz".to_string()
}

fn default_smoke_path() -> String {
    "/stores/00000000000000000000000000".to_string()
}

fn default_readiness_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pg_base_dir: default_pg_base_dir(),
            binaries_dir: default_binaries_dir(),
            service_bin: default_service_bin(),
            migrator_bins: default_migrator_bins(),
            config_dir_env: default_config_dir_env(),
            socket_path_env: default_socket_path_env(),
            database_name: default_database_name(),
            database_user: default_database_user(),
            database_schema: default_database_schema(),
            smoke_path: default_smoke_path(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Arc<Self>, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("pgcradle").required(false))
            .add_source(
                config::Environment::with_prefix("PGCRADLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Config = config.try_deserialize()?;
        Ok(Arc::new(settings))
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn service_path(&self) -> PathBuf {
        self.binaries_dir.join(&self.service_bin)
    }
}

/// The configuration artifact the service under test reads at startup:
/// where the database lives and how to authenticate to it.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Socket directory of the cluster, used as the host reference.
    pub database_host: PathBuf,
    pub database_name: String,
    pub database_user: String,
    #[serde(default)]
    pub database_pass: String,
}

// Custom Debug implementation to keep the password out of logs
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("database_host", &self.database_host)
            .field("database_name", &self.database_name)
            .field("database_user", &self.database_user)
            .field("database_pass", &"[REDACTED]")
            .finish()
    }
}

impl ServiceConfig {
    /// Serialize to the YAML file the service reads at startup.
    pub fn write(&self, path: &Path) -> HarnessResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}
