pub mod cluster;
pub mod installation;

pub use cluster::{Cluster, ClusterGuard, ClusterStatus};
pub use installation::Installation;
