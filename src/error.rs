use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no PostgreSQL installation found under {}", .base.display())]
    NoInstallation { base: PathBuf },

    #[error("{command} failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error(
        "cluster at {} is in an unknown state: pg_ctl status exited with {status}",
        .data_dir.display()
    )]
    UnknownClusterState {
        status: ExitStatus,
        data_dir: PathBuf,
    },

    #[error(
        "readiness signal {} did not appear within {waited:?}",
        .path.display()
    )]
    ReadinessTimeout { path: PathBuf, waited: Duration },

    #[error("smoke request returned status {status}")]
    SmokeFailed { status: StatusCode },

    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid HTTP request: {0}")]
    HttpRequest(#[from] hyper::http::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
