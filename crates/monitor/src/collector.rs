//! Per-member health snapshot collection.

use futures::future::join_all;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use raftwatch_status::{
    DEFAULT_FRESHNESS_MS, Database, HealthSnapshot, parse_cluster_status, parse_local_view,
};

use crate::error::{Error, Result};
use crate::exec::{CommandRunner, MemberTarget};

/// Tunables for member collection.
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Deadline applied to every individual remote command.
    pub exec_timeout: Duration,
    /// Last-message age above which a legacy entry counts as disconnected.
    pub freshness_threshold_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            exec_timeout: Duration::from_secs(5),
            freshness_threshold_ms: DEFAULT_FRESHNESS_MS,
        }
    }
}

/// Command querying the server table for a member's local view.
#[must_use]
pub fn local_view_command(database: Database) -> Vec<String> {
    let query = format!(
        r#"["_Server",{{"op":"select","table":"Database","where":[["name","==","{}"]],"columns":["leader","connected","cid","sid","index"]}}]"#,
        database.db_name()
    );
    vec!["db-client".to_string(), "query".to_string(), query]
}

/// Command introspecting the cluster state over the local control socket.
#[must_use]
pub fn cluster_status_command(database: Database) -> Vec<String> {
    vec![
        "db-ctl".to_string(),
        format!("--socket={}", database.control_socket()),
        "cluster/status".to_string(),
        database.db_name().to_string(),
    ]
}

/// Collects one member's health snapshot for one database.
///
/// # Errors
///
/// Transport failures, timeouts, non-zero exits and parse failures are all
/// reported; the caller treats any of them as a per-member failure.
pub async fn collect_member(
    runner: &dyn CommandRunner,
    config: &CollectorConfig,
    target: &MemberTarget,
    database: Database,
) -> Result<HealthSnapshot> {
    let raw_local = run(runner, config, target, &local_view_command(database)).await?;
    let local = parse_local_view(&raw_local)?;

    let raw_status = run(runner, config, target, &cluster_status_command(database)).await?;
    let status = parse_cluster_status(&raw_status, config.freshness_threshold_ms)?;

    debug!(member = %target, database = %database, servers = status.servers.len(), "collected snapshot");
    Ok(HealthSnapshot {
        database,
        local,
        status,
    })
}

/// Collects snapshots for all members concurrently.
///
/// Per-member failures are logged and reduce the sample; they never abort
/// the pass.
pub async fn collect_database(
    runner: &dyn CommandRunner,
    config: &CollectorConfig,
    targets: &[MemberTarget],
    database: Database,
) -> Vec<HealthSnapshot> {
    let attempts = targets
        .iter()
        .map(|target| async move { (target, collect_member(runner, config, target, database).await) });

    join_all(attempts)
        .await
        .into_iter()
        .filter_map(|(target, outcome)| match outcome {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!(member = %target, database = %database, %error, "skipping member for this pass");
                None
            }
        })
        .collect()
}

async fn run(
    runner: &dyn CommandRunner,
    config: &CollectorConfig,
    target: &MemberTarget,
    command: &[String],
) -> Result<String> {
    let output = timeout(config.exec_timeout, runner.exec(target, command))
        .await
        .map_err(|_| Error::Timeout(config.exec_timeout))??;

    if !output.success() {
        return Err(Error::CommandStatus {
            code: output.exit_code,
            stderr: output.stderr,
        });
    }
    Ok(output.stdout)
}
