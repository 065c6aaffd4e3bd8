//! Ephemeral-PostgreSQL bring-up harness.
//!
//! pgcradle provisions a throwaway PostgreSQL cluster inside a private
//! sandbox directory, runs schema migrations, starts a database-backed
//! service against it over a unix socket, verifies the service answers a
//! smoke request, and guarantees teardown regardless of outcome.

pub mod config;
pub mod error;
pub mod postgres;
pub mod process;
pub mod scenario;

pub use config::{Config, ServiceConfig};
pub use error::{HarnessError, HarnessResult};
pub use postgres::{Cluster, ClusterGuard, ClusterStatus, Installation};
pub use process::Exec;
pub use scenario::Scenario;
