//! Health collection and periodic reconciliation for a replicated database
//! cluster.
//!
//! One [`ClusterMonitor`] instance watches a fixed member group: each pass it
//! discovers members, collects one health snapshot per member and database
//! (tolerating partial failure), reconciles the views, emits metrics, and
//! publishes a live human-readable summary.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod collector;
mod error;
mod exec;
mod monitor;
mod summary;

pub use collector::{CollectorConfig, cluster_status_command, collect_database, collect_member, local_view_command};
pub use error::{Error, Result};
pub use exec::{CommandRunner, ExecOutput, HintSource, MemberDiscovery, MemberTarget};
pub use monitor::{ClusterMonitor, MonitorConfig};
pub use summary::{KEEPALIVE_NOTICE, SummaryPublisher};
