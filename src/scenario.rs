use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Method, Request, StatusCode, header};
use hyper_util::rt::TokioIo;
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::process::Child;
use tokio::time::{Instant, sleep};

use crate::config::{Config, SERVICE_CONFIG_FILE, ServiceConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::postgres::{Cluster, ClusterGuard, Installation};
use crate::process::Exec;

/// File name of the service's unix socket inside the sandbox.
const SERVICE_SOCKET_FILE: &str = "authd.sock";
const SERVICE_LOG_FILE: &str = "authd.log";

/// One end-to-end bring-up: sandbox, cluster, migrations, service, smoke
/// request.
///
/// Every resource is parked in a drop-guarded slot the moment it is
/// acquired, so an error at any later step still tears down everything
/// acquired so far. Field order is teardown order: the service handle is
/// killed first, then the cluster is destroyed, then the sandbox removed.
pub struct Scenario {
    config: Arc<Config>,
    service: Option<Child>,
    cluster: Option<ClusterGuard>,
    sandbox: Option<TempDir>,
}

impl Scenario {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            service: None,
            cluster: None,
            sandbox: None,
        }
    }

    /// Drive the full bring-up sequence. The first error aborts the
    /// remaining steps and is surfaced verbatim; acquired resources are
    /// released by [`Scenario::teardown`] or on drop.
    pub async fn bring_up(&mut self) -> HarnessResult<()> {
        let installation = Installation::shared(&self.config.pg_base_dir)?.clone();
        tracing::info!("using PostgreSQL {}", installation.version());

        let sandbox = TempDir::new()?;
        let root = sandbox.path().to_path_buf();
        self.sandbox = Some(sandbox);
        tracing::info!("sandbox at {}", root.display());

        let cluster = Cluster::new(installation, root.join("db"))?;
        let guard = self.cluster.insert(ClusterGuard::new(cluster));
        let cluster = guard.cluster();
        cluster.start().await?;
        tracing::info!("cluster running at {}", cluster.data_dir().display());

        cluster.create_database(&self.config.database_name).await?;
        cluster
            .create_schema(&self.config.database_name, &self.config.database_schema)
            .await?;

        let service_config = ServiceConfig {
            database_host: cluster.socket_dir().to_path_buf(),
            database_name: self.config.database_name.clone(),
            database_user: self.config.database_user.clone(),
            database_pass: String::new(),
        };
        service_config.write(&root.join(SERVICE_CONFIG_FILE))?;

        let dsn = connection_string(&self.config, cluster.socket_dir());
        for migrator in &self.config.migrator_bins {
            let path = self.config.binaries_dir.join(migrator);
            tracing::info!("running migration {}", path.display());
            Exec::new(path).arg(&dsn).run().await?;
        }

        let socket_path = root.join(SERVICE_SOCKET_FILE);
        let service = Exec::new(self.config.service_path())
            .env(&self.config.config_dir_env, &root)
            .env(&self.config.socket_path_env, &socket_path)
            .spawn(&root.join(SERVICE_LOG_FILE))?;
        self.service = Some(service);
        tracing::info!("service spawned, waiting for {}", socket_path.display());

        wait_for_socket(
            &socket_path,
            self.config.readiness_timeout(),
            self.config.poll_interval(),
        )
        .await?;

        let status = unix_get(&socket_path, &self.config.smoke_path).await?;
        if !status.is_success() {
            return Err(HarnessError::SmokeFailed { status });
        }
        tracing::info!("smoke request to {} returned {}", self.config.smoke_path, status);
        Ok(())
    }

    /// Sandbox root, if one has been acquired and not yet torn down.
    pub fn sandbox_dir(&self) -> Option<&Path> {
        self.sandbox.as_ref().map(|sandbox| sandbox.path())
    }

    /// Release resources in reverse acquisition order. Best-effort: each
    /// step logs its own failures and never skips the following steps.
    /// Dropping the scenario performs equivalent cleanup; this form also
    /// reaps the service child.
    pub async fn teardown(&mut self) {
        if let Some(mut service) = self.service.take() {
            if let Err(err) = service.kill().await {
                tracing::warn!("failed to terminate service: {}", err);
            }
        }
        if let Some(guard) = self.cluster.take() {
            guard.destroy().await;
        }
        if let Some(sandbox) = self.sandbox.take() {
            if let Err(err) = sandbox.close() {
                tracing::warn!("failed to remove sandbox: {}", err);
            }
        }
    }
}

/// Run one scenario end-to-end, then tear everything down. Teardown never
/// masks the scenario's own error.
pub async fn run(config: Arc<Config>) -> HarnessResult<()> {
    let mut scenario = Scenario::new(config);
    let result = scenario.bring_up().await;
    scenario.teardown().await;
    result
}

/// Connection string handed to the migrators, addressing the cluster via
/// its socket directory and scoping them to the service's schema.
fn connection_string(config: &Config, socket_dir: &Path) -> String {
    let host: String =
        url::form_urlencoded::byte_serialize(socket_dir.as_os_str().as_encoded_bytes()).collect();
    format!(
        "postgres://{}@localhost/{}?host={}&search_path={}",
        config.database_user, config.database_name, host, config.database_schema
    )
}

/// Poll for the readiness signal at a fixed interval up to a hard deadline.
/// Exceeding the deadline is a scenario failure, not a panic.
pub async fn wait_for_socket(
    path: &Path,
    timeout: Duration,
    interval: Duration,
) -> HarnessResult<()> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return Ok(());
        }
        sleep(interval).await;
    }
    Err(HarnessError::ReadinessTimeout {
        path: path.to_path_buf(),
        waited: timeout,
    })
}

/// One HTTP GET over a unix socket; only the status code matters.
async fn unix_get(socket: &Path, resource: &str) -> HarnessResult<StatusCode> {
    let stream = UnixStream::connect(socket).await?;
    let io = TokioIo::new(stream);
    let (mut sender, connection) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!("smoke connection error: {}", err);
        }
    });

    let request = Request::builder()
        .method(Method::GET)
        .uri(resource)
        .header(header::HOST, "localhost")
        .body(Empty::<Bytes>::new())?;

    let response = sender.send_request(request).await?;
    Ok(response.status())
}
