//! Tests requiring a real PostgreSQL installation; run with `--ignored`

use std::path::Path;

use pgcradle::postgres::installation::DEFAULT_BASE_DIR;
use pgcradle::{Cluster, ClusterGuard, HarnessError, Installation};

use crate::common::init_logging;

fn installed_engine() -> Installation {
    Installation::discover(Path::new(DEFAULT_BASE_DIR)).expect("PostgreSQL must be installed")
}

#[tokio::test]
#[ignore]
async fn real_cluster_start_stop_cycle() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new(installed_engine(), dir.path().join("db")).unwrap();
    let guard = ClusterGuard::new(cluster);
    let cluster = guard.cluster();

    assert!(!cluster.exists());
    cluster.start().await.unwrap();
    assert!(cluster.exists());
    assert!(cluster.running().await.unwrap());

    cluster.stop().await.unwrap();
    assert!(!cluster.running().await.unwrap());
    assert!(cluster.exists());

    guard.destroy().await;
    assert!(!dir.path().join("db").exists());
}

#[tokio::test]
#[ignore]
async fn create_database_rejects_duplicates() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new(installed_engine(), dir.path().join("db")).unwrap();
    let guard = ClusterGuard::new(cluster);
    let cluster = guard.cluster();

    cluster.start().await.unwrap();
    cluster.create_database("cradle_test").await.unwrap();

    let err = cluster.create_database("cradle_test").await.unwrap_err();
    assert!(matches!(err, HarnessError::Database(_)));
}

#[tokio::test]
#[ignore]
async fn connect_and_prepare_schema() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new(installed_engine(), dir.path().join("db")).unwrap();
    let guard = ClusterGuard::new(cluster);
    let cluster = guard.cluster();

    cluster.start().await.unwrap();
    cluster.create_database("cradle_test").await.unwrap();

    // Schema creation is idempotent
    cluster.create_schema("cradle_test", "authz").await.unwrap();
    cluster.create_schema("cradle_test", "authz").await.unwrap();

    let mut conn = cluster.connect("cradle_test").await.unwrap();
    let row: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(row.0, 1);
}
