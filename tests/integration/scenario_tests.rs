//! Bring-up orchestrator tests
//!
//! The end-to-end scenario needs a real PostgreSQL installation plus the
//! service and migrator binaries, so it only runs with `--ignored`. The
//! failure-path test runs anywhere: it uses the scripted engine, fails at
//! the first database step, and checks the error surfaces while teardown
//! still completes.

use std::sync::Arc;

use pgcradle::config::Config;
use pgcradle::{HarnessError, Scenario, scenario};

use crate::common::{FakeEngine, init_logging};

#[tokio::test]
async fn bring_up_failure_is_surfaced_and_torn_down() {
    init_logging();
    let engine = FakeEngine::new();
    let config = Arc::new(Config {
        pg_base_dir: engine.base_dir().to_path_buf(),
        ..Config::default()
    });

    // The fake engine starts no real server, so the first connection
    // attempt must fail. The error is the scenario's, not teardown's.
    let mut scenario = Scenario::new(config);
    let err = scenario.bring_up().await.expect_err("no server to talk to");
    assert!(
        matches!(err, HarnessError::Database(_) | HarnessError::Io(_)),
        "expected a connection failure, got: {err}"
    );

    // Everything acquired before the failure must still be removed.
    let sandbox = scenario
        .sandbox_dir()
        .expect("sandbox was acquired")
        .to_path_buf();
    let data_dir = sandbox.join("db");
    assert!(data_dir.exists());

    scenario.teardown().await;
    assert!(!data_dir.exists());
    assert!(!sandbox.exists());
}

#[tokio::test]
#[ignore]
async fn end_to_end_bring_up() {
    init_logging();
    let config = Config::load().expect("config loads");
    scenario::run(config).await.expect("scenario succeeds");
}
