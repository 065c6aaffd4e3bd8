use std::path::{Path, PathBuf};

use sqlx::{Connection, Executor, PgConnection, postgres::PgConnectOptions};

use crate::error::{HarnessError, HarnessResult};
use crate::postgres::Installation;
use crate::process::Exec;

/// Derived state of a cluster's server process. Never cached: every query
/// goes back to `pg_ctl status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Running,
    Stopped,
}

/// One PostgreSQL cluster bound to a single data directory.
///
/// The data directory holds everything: persisted state, the server log and
/// the unix socket the server listens on. The server never opens a TCP
/// listener. All operations are idempotent unless noted otherwise.
pub struct Cluster {
    data_dir: PathBuf,
    installation: Installation,
}

impl Cluster {
    pub fn new(installation: Installation, data_dir: impl AsRef<Path>) -> HarnessResult<Self> {
        Ok(Self {
            data_dir: std::path::absolute(data_dir)?,
            installation,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The directory the server's unix socket lives in.
    pub fn socket_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("db.log")
    }

    /// True once initdb has populated the data directory.
    pub fn exists(&self) -> bool {
        self.data_dir.join("PG_VERSION").is_file()
    }

    /// `pg_ctl` scoped to this data directory and nothing else.
    fn pg_ctl(&self) -> Exec {
        Exec::new(self.installation.bin("pg_ctl"))
            .env("PGDATA", &self.data_dir)
            .env("PGHOST", &self.data_dir)
    }

    /// The single source of truth for "is the server running". Every other
    /// operation composes on this rather than re-deriving state.
    pub async fn status(&self) -> HarnessResult<ClusterStatus> {
        let status = self.pg_ctl().arg("status").exit_status().await?;
        interpret_status(status.code(), self.exists()).ok_or_else(|| {
            HarnessError::UnknownClusterState {
                status,
                data_dir: self.data_dir.clone(),
            }
        })
    }

    pub async fn running(&self) -> HarnessResult<bool> {
        Ok(self.status().await? == ClusterStatus::Running)
    }

    /// Initialize the data directory. No-op if it already exists. Trust
    /// auth with no password is a testing-only policy.
    pub async fn create(&self) -> HarnessResult<()> {
        if self.exists() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.data_dir).await?;
        self.pg_ctl()
            .args(["init", "-s", "-o", "-E utf8 -A trust"])
            .run()
            .await
    }

    /// Start the server, creating the cluster first if needed. Binds only a
    /// unix socket inside the data directory and blocks until the server
    /// reports ready. No-op if already running.
    pub async fn start(&self) -> HarnessResult<()> {
        if self.running().await? {
            return Ok(());
        }
        self.create().await?;

        let server_opts = format!("-h '' -F -k {}", self.data_dir.display());
        self.pg_ctl()
            .args(["start", "-s", "-w"])
            .arg("-l")
            .arg(self.log_file())
            .arg("-o")
            .arg(server_opts)
            .run()
            .await
    }

    /// Graceful bounded shutdown. No-op if not running.
    pub async fn stop(&self) -> HarnessResult<()> {
        if !self.running().await? {
            return Ok(());
        }
        self.pg_ctl()
            .args(["stop", "-s", "-w", "-m", "fast"])
            .run()
            .await
    }

    /// Stop the server if it is running, then delete the data directory.
    /// Idempotent and safe even if the cluster never started.
    pub async fn destroy(&self) -> HarnessResult<()> {
        if let Err(err) = self.stop().await {
            tracing::warn!("ignoring stop failure during destroy: {}", err);
        }
        match tokio::fs::remove_dir_all(&self.data_dir).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    /// Open a client session over the cluster's socket as the OS user that
    /// owns the cluster. Fails if no listener is reachable; the database
    /// name is not validated here.
    pub async fn connect(&self, database: &str) -> HarnessResult<PgConnection> {
        // The socket file name embeds the port; pin it so ambient PGPORT
        // in the harness process cannot redirect the client.
        let options = PgConnectOptions::new()
            .socket(&self.data_dir)
            .port(5432)
            .username(&whoami::username())
            .database(database);
        Ok(PgConnection::connect_with(&options).await?)
    }

    /// Create a logical database. Deliberately not idempotent: a duplicate
    /// name is an error, surfacing accidental reuse of a cluster.
    pub async fn create_database(&self, name: &str) -> HarnessResult<()> {
        if !is_valid_identifier(name) {
            return Err(HarnessError::InvalidIdentifier(name.to_string()));
        }
        let mut conn = self.connect("template1").await?;
        conn.execute(format!("CREATE DATABASE {}", quote_ident(name)).as_str())
            .await?;
        Ok(())
    }

    /// Create a schema inside `database` if it is not already present.
    pub async fn create_schema(&self, database: &str, schema: &str) -> HarnessResult<()> {
        if !is_valid_identifier(schema) {
            return Err(HarnessError::InvalidIdentifier(schema.to_string()));
        }
        let mut conn = self.connect(database).await?;
        conn.execute(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)).as_str())
            .await?;
        Ok(())
    }
}

/// Map a `pg_ctl status` exit code onto a cluster state. 0 means a server
/// is running, 3 means no server, 4 means pg_ctl could not read the data
/// directory, which only implies "stopped" when the directory is absent.
/// Anything else has no safe interpretation and yields `None`.
fn interpret_status(code: Option<i32>, exists: bool) -> Option<ClusterStatus> {
    match code {
        Some(0) => Some(ClusterStatus::Running),
        Some(3) => Some(ClusterStatus::Stopped),
        Some(4) if !exists => Some(ClusterStatus::Stopped),
        _ => None,
    }
}

/// Scope-based teardown for a cluster: constructed the moment the cluster
/// is acquired, so a failure anywhere later still destroys it. Dropping the
/// guard performs a blocking best-effort stop and directory removal;
/// [`ClusterGuard::destroy`] is the tidier async form.
pub struct ClusterGuard {
    cluster: Cluster,
    armed: bool,
}

impl ClusterGuard {
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            armed: true,
        }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Consume the guard and destroy the cluster now. Failures are logged
    /// and swallowed: teardown must never mask a scenario error.
    pub async fn destroy(mut self) {
        self.armed = false;
        if let Err(err) = self.cluster.destroy().await {
            tracing::warn!(
                "cluster teardown at {} failed: {}",
                self.cluster.data_dir().display(),
                err
            );
        }
    }
}

impl Drop for ClusterGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Drop is synchronous; on a multi-thread runtime worker, tell the
        // runtime so a slow pg_ctl stop does not stall queued tasks.
        match tokio::runtime::Handle::try_current() {
            Ok(handle)
                if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread =>
            {
                tokio::task::block_in_place(|| self.blocking_destroy());
            }
            _ => self.blocking_destroy(),
        }
    }
}

impl ClusterGuard {
    /// Blocking best-effort stop and directory removal, for use where no
    /// async context is available.
    fn blocking_destroy(&self) {
        let data_dir = &self.cluster.data_dir;
        let stop = std::process::Command::new(self.cluster.installation.bin("pg_ctl"))
            .env_clear()
            .env("PGDATA", data_dir)
            .env("PGHOST", data_dir)
            .args(["stop", "-s", "-w", "-m", "fast"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        if let Err(err) = stop {
            tracing::warn!("cluster stop during teardown failed: {}", err);
        }
        if let Err(err) = std::fs::remove_dir_all(data_dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "failed to remove data directory {}: {}",
                    data_dir.display(),
                    err
                );
            }
        }
    }
}

/// Validate that an identifier is safe to interpolate into SQL.
fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

/// Quote an identifier for safe use in SQL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
