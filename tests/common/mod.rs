//! Common test utilities and fixtures
//!
//! Provides a scripted stand-in for the PostgreSQL control binary so the
//! cluster lifecycle can be exercised without a real installation. State
//! lives in `$PGDATA/state`; a `force_status` file lets tests force
//! arbitrary `pg_ctl status` exit codes.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Once;

use tempfile::TempDir;

use pgcradle::Installation;

static INIT: Once = Once::new();

/// Initialize test logging
pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("pgcradle=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// The script only uses shell builtins and redirection because the harness
// spawns it with a cleared environment, so there is no PATH to resolve
// external commands against.
const FAKE_PG_CTL: &str = r#"#!/bin/sh
# Scripted pg_ctl stand-in. Running state lives in $PGDATA/state.
case "$1" in
init)
    echo 17 > "$PGDATA/PG_VERSION"
    echo off > "$PGDATA/state"
    ;;
start)
    read state < "$PGDATA/state"
    [ "$state" = on ] && exit 1
    echo on > "$PGDATA/state"
    ;;
stop)
    echo off > "$PGDATA/state"
    ;;
status)
    [ -f "$PGDATA/force_status" ] && { read code < "$PGDATA/force_status"; exit "$code"; }
    [ -f "$PGDATA/PG_VERSION" ] || exit 4
    read state < "$PGDATA/state"
    [ "$state" = on ] && exit 0
    exit 3
    ;;
esac
exit 0
"#;

/// A fake versioned PostgreSQL install rooted in a temp directory.
pub struct FakeEngine {
    base: TempDir,
}

impl FakeEngine {
    pub fn new() -> Self {
        let base = tempfile::tempdir().expect("create fake engine dir");
        let bin = base.path().join("17/bin");
        std::fs::create_dir_all(&bin).expect("create fake bin dir");

        let pg_ctl = bin.join("pg_ctl");
        std::fs::write(&pg_ctl, FAKE_PG_CTL).expect("write fake pg_ctl");
        let mut perms = std::fs::metadata(&pg_ctl)
            .expect("stat fake pg_ctl")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&pg_ctl, perms).expect("chmod fake pg_ctl");

        Self { base }
    }

    pub fn base_dir(&self) -> &Path {
        self.base.path()
    }

    pub fn installation(&self) -> Installation {
        Installation::discover(self.base.path()).expect("fake engine is discoverable")
    }
}

/// Make the fake `pg_ctl status` exit with `code` for this data directory.
pub fn force_status(data_dir: &Path, code: i32) {
    std::fs::write(data_dir.join("force_status"), format!("{code}\n"))
        .expect("write force_status");
}
