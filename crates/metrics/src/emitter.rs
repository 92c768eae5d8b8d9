//! Emitter mapping analysis results onto the metric catalog.
//!
//! Sparse and per-member series are bookkept exactly: before a pass writes
//! under a (database, cluster id) key, every series written for that key in
//! the previous pass is deleted, so series never outlive the members or IPs
//! they describe.

use prometheus::Registry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use raftwatch_quorum::ExtendedConsensusResult;
use raftwatch_status::Database;

use crate::error::Result;
use crate::families::MetricFamilies;

/// Per-member observations derived from one pass, keyed by full member id.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemberSample {
    /// The member is considered connected.
    pub connected: bool,
    /// The member reports itself leader.
    pub leader: bool,
    /// The member's local log index, when it reported one.
    pub log_index: Option<i64>,
    /// Stalest last-message age reported about this member.
    pub last_msg_age_ms: Option<u64>,
    /// The member produced its own view this pass.
    pub reporting: bool,
}

type ScopeKey = (&'static str, String);

#[derive(Default)]
struct ScopeState {
    last_leader: Option<String>,
    unexpected_ips: Vec<String>,
    missing_ips: Vec<String>,
    conflict_ips: Vec<String>,
    suspects: Vec<String>,
    members: Vec<String>,
}

/// Health metric emitter with explicit series lifecycle.
pub struct HealthMetrics {
    families: MetricFamilies,
    scopes: Mutex<HashMap<ScopeKey, ScopeState>>,
}

impl HealthMetrics {
    /// Registers the full metric catalog against `registry`.
    ///
    /// # Errors
    ///
    /// Fails when a metric family cannot be created or registered.
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            families: MetricFamilies::new(registry)?,
            scopes: Mutex::new(HashMap::new()),
        })
    }

    /// Records one pass's analysis for a (database, cluster instance).
    ///
    /// `samples` must cover every member id in the result's union; series for
    /// members and IPs written in the previous pass but absent now are
    /// deleted before the new values are written.
    pub fn record(
        &self,
        database: Database,
        cluster_id: &str,
        result: &ExtendedConsensusResult,
        samples: &BTreeMap<String, MemberSample>,
    ) {
        let db = database.as_str();
        let mut scopes = self.scopes.lock().expect("metrics state poisoned");
        let scope = scopes.entry((db, cluster_id.to_string())).or_default();

        self.clear_scoped_series(db, cluster_id, scope);

        let f = &self.families;
        let base = [db, cluster_id];
        f.has_quorum
            .with_label_values(&base)
            .set(i64::from(result.consensus.has_majority));
        f.all_agree
            .with_label_values(&base)
            .set(i64::from(result.consensus.all_agree));
        f.expected_members
            .with_label_values(&base)
            .set(result.expected_replicas.unwrap_or(0) as i64);
        f.observed_members
            .with_label_values(&base)
            .set(result.member_ids.len() as i64);
        f.observed_ips
            .with_label_values(&base)
            .set(result.ips.len() as i64);
        f.member_excess
            .with_label_values(&base)
            .set(result.excess as i64);
        f.member_shortfall
            .with_label_values(&base)
            .set(result.shortfall as i64);
        f.ip_conflicts
            .with_label_values(&base)
            .set(result.ip_conflicts.len() as i64);
        f.address_disagreements
            .with_label_values(&base)
            .set(result.address_disagreements.len() as i64);
        f.majority_size
            .with_label_values(&base)
            .set(result.consensus.majority.len() as i64);
        f.minority_size
            .with_label_values(&base)
            .set(result.consensus.minority.len() as i64);
        f.diff_total
            .with_label_values(&base)
            .set(result.consensus.diff_total() as i64);

        for ip in &result.unexpected_ips {
            f.unexpected_ip.with_label_values(&[db, cluster_id, ip]).set(1);
            scope.unexpected_ips.push(ip.clone());
        }
        for ip in &result.missing_expected_ips {
            f.missing_expected_ip
                .with_label_values(&[db, cluster_id, ip])
                .set(1);
            scope.missing_ips.push(ip.clone());
        }
        for (ip, claimants) in &result.ip_conflicts {
            f.ip_conflict_claims
                .with_label_values(&[db, cluster_id, ip])
                .set(claimants.len() as i64);
            scope.conflict_ips.push(ip.clone());
        }
        for suspect in &result.suspect_stale {
            f.suspect_stale
                .with_label_values(&[db, cluster_id, &suspect.id])
                .set(suspect.score as i64);
            scope.suspects.push(suspect.id.clone());
        }

        let leader_index = samples
            .values()
            .filter(|sample| sample.leader)
            .filter_map(|sample| sample.log_index)
            .max();

        for (member, sample) in samples {
            let labels = [db, cluster_id, member.as_str()];
            f.member_connected
                .with_label_values(&labels)
                .set(i64::from(sample.connected));
            f.member_leader
                .with_label_values(&labels)
                .set(i64::from(sample.leader));
            f.member_reporting
                .with_label_values(&labels)
                .set(i64::from(sample.reporting));
            f.member_missing_reporter
                .with_label_values(&labels)
                .set(i64::from(result.missing_reporters.contains(member)));
            if let Some(index) = sample.log_index {
                f.member_log_index.with_label_values(&labels).set(index);
                if let Some(leader_index) = leader_index {
                    f.member_index_gap
                        .with_label_values(&labels)
                        .set((leader_index - index).max(0));
                }
            }
            if let Some(age) = sample.last_msg_age_ms {
                f.member_last_msg_age_ms
                    .with_label_values(&labels)
                    .set(age as i64);
            }
            scope.members.push(member.clone());
        }

        // materialized on the first pass so a zero count is visible
        let transitions = f.leader_transitions.with_label_values(&base);
        let current_leader = samples
            .iter()
            .find(|(_, sample)| sample.leader)
            .map(|(member, _)| member.clone());
        if let Some(current) = current_leader {
            if let Some(previous) = &scope.last_leader {
                if previous != &current {
                    debug!(database = db, cluster_id, %previous, %current, "leader changed");
                    transitions.inc();
                }
            }
            scope.last_leader = Some(current);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        f.last_snapshot_timestamp.with_label_values(&base).set(now);
    }

    /// Deletes every series for a (database, cluster instance) and forgets
    /// its state. Called when the cluster instance is no longer observed.
    pub fn prune(&self, database: Database, cluster_id: &str) {
        let db = database.as_str();
        let mut scopes = self.scopes.lock().expect("metrics state poisoned");
        let Some(mut scope) = scopes.remove(&(db, cluster_id.to_string())) else {
            return;
        };

        debug!(database = db, cluster_id, "pruning metric series");
        self.clear_scoped_series(db, cluster_id, &mut scope);

        let f = &self.families;
        let base = [db, cluster_id];
        for family in [
            &f.has_quorum,
            &f.all_agree,
            &f.expected_members,
            &f.observed_members,
            &f.observed_ips,
            &f.member_excess,
            &f.member_shortfall,
            &f.ip_conflicts,
            &f.address_disagreements,
            &f.majority_size,
            &f.minority_size,
            &f.diff_total,
        ] {
            let _ = family.remove_label_values(&base);
        }
        let _ = f.leader_transitions.remove_label_values(&base);
        let _ = f.last_snapshot_timestamp.remove_label_values(&base);
    }

    /// Cluster instance ids currently carrying series for `database`.
    #[must_use]
    pub fn tracked_cluster_ids(&self, database: Database) -> Vec<String> {
        let scopes = self.scopes.lock().expect("metrics state poisoned");
        scopes
            .keys()
            .filter(|(db, _)| *db == database.as_str())
            .map(|(_, cluster_id)| cluster_id.clone())
            .collect()
    }

    fn clear_scoped_series(&self, db: &str, cluster_id: &str, scope: &mut ScopeState) {
        let f = &self.families;
        for ip in scope.unexpected_ips.drain(..) {
            let _ = f.unexpected_ip.remove_label_values(&[db, cluster_id, &ip]);
        }
        for ip in scope.missing_ips.drain(..) {
            let _ = f.missing_expected_ip.remove_label_values(&[db, cluster_id, &ip]);
        }
        for ip in scope.conflict_ips.drain(..) {
            let _ = f.ip_conflict_claims.remove_label_values(&[db, cluster_id, &ip]);
        }
        for member in scope.suspects.drain(..) {
            let _ = f.suspect_stale.remove_label_values(&[db, cluster_id, &member]);
        }
        for member in scope.members.drain(..) {
            for family in [
                &f.member_connected,
                &f.member_leader,
                &f.member_log_index,
                &f.member_index_gap,
                &f.member_reporting,
                &f.member_missing_reporter,
                &f.member_last_msg_age_ms,
            ] {
                let _ = family.remove_label_values(&[db, cluster_id, &member]);
            }
        }
    }
}
