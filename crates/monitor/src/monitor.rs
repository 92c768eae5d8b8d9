//! The periodic reconciliation service.

use prometheus::Registry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use raftwatch_metrics::{HealthMetrics, MemberSample};
use raftwatch_quorum::{
    ExtendedConsensusResult, MemberView, analyze_extended, normalize_views,
};
use raftwatch_status::{Database, HealthSnapshot};

use crate::collector::{CollectorConfig, collect_database};
use crate::error::{Error, Result};
use crate::exec::{CommandRunner, HintSource, MemberDiscovery};
use crate::summary::SummaryPublisher;

/// Tunables for the reconciliation service.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Pause between reconciliation passes.
    pub interval: Duration,
    /// Databases to diagnose each pass.
    pub databases: Vec<Database>,
    /// Collection tunables.
    pub collector: CollectorConfig,
    /// Per-subscriber summary buffer size.
    pub summary_buffer: usize,
    /// Idle period after which subscribers receive a keep-alive notice.
    pub keepalive_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            databases: vec![Database::Northbound, Database::Southbound],
            collector: CollectorConfig::default(),
            summary_buffer: 16,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// Cluster instance ids observed per database, carried between passes so
/// vanished instances can be pruned.
#[derive(Default)]
struct PassState {
    seen: HashMap<Database, BTreeSet<String>>,
}

/// Periodic health reconciliation for one member group.
pub struct ClusterMonitor {
    config: MonitorConfig,
    discovery: Arc<dyn MemberDiscovery>,
    runner: Arc<dyn CommandRunner>,
    hints: Option<Arc<dyn HintSource>>,
    metrics: HealthMetrics,
    summary: Arc<SummaryPublisher>,
    // Held across a whole pass: concurrent triggers serialize here.
    state: Mutex<PassState>,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl ClusterMonitor {
    /// Creates a monitor, registering its metric catalog against `registry`.
    ///
    /// # Errors
    ///
    /// Fails when the metric catalog cannot be registered.
    pub fn new(
        config: MonitorConfig,
        discovery: Arc<dyn MemberDiscovery>,
        runner: Arc<dyn CommandRunner>,
        hints: Option<Arc<dyn HintSource>>,
        registry: &Registry,
    ) -> Result<Self> {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Ok(Self {
            metrics: HealthMetrics::new(registry)?,
            summary: Arc::new(SummaryPublisher::new(config.summary_buffer)),
            config,
            discovery,
            runner,
            hints,
            state: Mutex::new(PassState::default()),
            trigger_tx,
            trigger_rx: std::sync::Mutex::new(Some(trigger_rx)),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Subscribes to the live summary feed.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::Receiver<String> {
        self.summary.subscribe()
    }

    /// Requests an immediate pass, in addition to the timer.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Starts the timer loop and the keep-alive task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] when called twice.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut trigger_rx = self
            .trigger_rx
            .lock()
            .expect("trigger state poisoned")
            .take()
            .ok_or(Error::AlreadyStarted)?;

        let monitor = Arc::clone(self);
        let token = self.shutdown.clone();
        self.tracker.spawn(async move {
            let mut tick = interval(monitor.config.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    trigger = trigger_rx.recv() => {
                        if trigger.is_none() {
                            break;
                        }
                    }
                    () = token.cancelled() => {
                        info!("cluster monitor stopped");
                        break;
                    }
                }
                if let Err(pass_error) = monitor.run_once().await {
                    error!(%pass_error, "reconciliation pass failed");
                }
            }
        });

        let summary = Arc::clone(&self.summary);
        let token = self.shutdown.clone();
        let keepalive = self.config.keepalive_interval;
        self.tracker.spawn(async move {
            let mut tick = interval(keepalive);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => summary.keepalive_if_idle(keepalive),
                    () = token.cancelled() => break,
                }
            }
        });

        Ok(())
    }

    /// Stops the service and waits for its tasks to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Runs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Only discovery failures abort a pass; per-member failures merely
    /// reduce the sample.
    pub async fn run_once(&self) -> Result<()> {
        let targets = self.discovery.list_members().await?;
        debug!(members = targets.len(), "starting reconciliation pass");

        let mut state = self.state.lock().await;
        let mut summary_text = String::new();

        for database in &self.config.databases {
            let database = *database;
            let snapshots = collect_database(
                self.runner.as_ref(),
                &self.config.collector,
                &targets,
                database,
            )
            .await;
            info!(
                database = %database,
                collected = snapshots.len(),
                members = targets.len(),
                "collected health snapshots"
            );

            let mut views: Vec<MemberView> =
                snapshots.iter().map(MemberView::from_snapshot).collect();
            let renames = normalize_views(&mut views);

            let hints = match &self.hints {
                Some(source) => source.hints(database).await,
                None => None,
            };
            let result = analyze_extended(&views, hints.as_ref());

            let observed: BTreeSet<String> = snapshots
                .iter()
                .map(|snapshot| snapshot.local.cluster_id.clone())
                .collect();
            if let Some(cluster_id) = dominant_cluster_id(&snapshots) {
                let samples = build_samples(&snapshots, &views, &renames, &result);
                self.metrics.record(database, &cluster_id, &result, &samples);
            }

            summary_text.push_str(&result.render(database.as_str()));
            let _ = writeln!(
                summary_text,
                "polled: {} of {} members\n",
                snapshots.len(),
                targets.len()
            );

            let previous = state.seen.insert(database, observed.clone()).unwrap_or_default();
            for stale in previous.difference(&observed) {
                info!(database = %database, cluster_id = %stale, "cluster instance vanished");
                self.metrics.prune(database, stale);
            }
        }

        self.summary.publish(summary_text);
        Ok(())
    }
}

/// The most frequently reported cluster id, ties broken by ascending id.
fn dominant_cluster_id(snapshots: &[HealthSnapshot]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for snapshot in snapshots {
        *counts.entry(snapshot.local.cluster_id.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (cluster_id, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((cluster_id, count)),
        }
    }
    best.map(|(cluster_id, _)| cluster_id.to_string())
}

/// Derives per-member observations for the metrics emitter, covering every
/// member id in the union.
fn build_samples(
    snapshots: &[HealthSnapshot],
    views: &[MemberView],
    renames: &BTreeMap<String, String>,
    result: &ExtendedConsensusResult,
) -> BTreeMap<String, MemberSample> {
    let mut samples: BTreeMap<String, MemberSample> = result
        .member_ids
        .iter()
        .map(|id| (id.clone(), MemberSample::default()))
        .collect();

    // Reporters carry their own local view.
    for (snapshot, view) in snapshots.iter().zip(views) {
        if let Some(sample) = samples.get_mut(&view.reporter) {
            sample.reporting = true;
            sample.leader = snapshot.local.leader;
            sample.connected = snapshot.local.connected;
            sample.log_index = Some(snapshot.local.log_index);
        }
    }

    // Peer-reported connectivity and message ages, keyed by normalized id.
    for snapshot in snapshots {
        for server in &snapshot.status.servers {
            let id = renames.get(&server.id).unwrap_or(&server.id);
            let Some(sample) = samples.get_mut(id) else {
                continue;
            };
            if let Some(age) = server.last_msg_age_ms {
                sample.last_msg_age_ms =
                    Some(sample.last_msg_age_ms.map_or(age, |known| known.max(age)));
            }
            if !sample.reporting && server.connected {
                sample.connected = true;
            }
        }
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use raftwatch_status::{ClusterServer, ClusterStatus, ServerLocalView};

    fn snapshot(cluster_id: &str) -> HealthSnapshot {
        HealthSnapshot {
            database: Database::Northbound,
            local: ServerLocalView {
                leader: false,
                connected: true,
                cluster_id: cluster_id.to_string(),
                server_id: "a".to_string(),
                log_index: 1,
            },
            status: ClusterStatus::default(),
        }
    }

    #[test]
    fn dominant_cluster_id_prefers_frequency_then_order() {
        let snapshots = vec![snapshot("cid-b"), snapshot("cid-a"), snapshot("cid-b")];
        assert_eq!(dominant_cluster_id(&snapshots), Some("cid-b".to_string()));

        let tied = vec![snapshot("cid-b"), snapshot("cid-a")];
        assert_eq!(dominant_cluster_id(&tied), Some("cid-a".to_string()));

        assert_eq!(dominant_cluster_id(&[]), None);
    }

    #[test]
    fn samples_cover_silent_members() {
        let mut server = ClusterServer {
            id: "b".to_string(),
            address: "ssl:10.0.0.2:6643".to_string(),
            role: None,
            is_self: false,
            connected: true,
            last_msg_age_ms: Some(500),
            next_index: None,
            match_index: None,
        };
        let mut snap = snapshot("cid-1");
        snap.local.leader = true;
        snap.status.servers = vec![
            ClusterServer {
                id: "a".to_string(),
                address: "ssl:10.0.0.1:6643".to_string(),
                role: None,
                is_self: true,
                connected: true,
                last_msg_age_ms: None,
                next_index: None,
                match_index: None,
            },
            server.clone(),
        ];

        let mut views = vec![MemberView::from_snapshot(&snap)];
        let renames = normalize_views(&mut views);
        let result = analyze_extended(&views, None);
        let samples = build_samples(std::slice::from_ref(&snap), &views, &renames, &result);

        assert!(samples["a"].reporting);
        assert!(samples["a"].leader);
        assert!(!samples["b"].reporting);
        assert!(samples["b"].connected);
        assert_eq!(samples["b"].last_msg_age_ms, Some(500));

        // a second report with a staler age wins
        server.last_msg_age_ms = Some(9000);
        snap.status.servers[1] = server;
        let samples = build_samples(std::slice::from_ref(&snap), &views, &renames, &result);
        assert_eq!(samples["b"].last_msg_age_ms, Some(9000));
    }
}
