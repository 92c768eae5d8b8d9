//! The metric catalog, registered against an injected registry.

use prometheus::{GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::error::Result;

const CLUSTER_LABELS: &[&str] = &["database", "cluster_id"];
const IP_LABELS: &[&str] = &["database", "cluster_id", "ip"];
const MEMBER_LABELS: &[&str] = &["database", "cluster_id", "member"];

/// All metric families, scoped by (database, cluster instance id).
pub struct MetricFamilies {
    // cluster-level gauges
    pub has_quorum: IntGaugeVec,
    pub all_agree: IntGaugeVec,
    pub expected_members: IntGaugeVec,
    pub observed_members: IntGaugeVec,
    pub observed_ips: IntGaugeVec,
    pub member_excess: IntGaugeVec,
    pub member_shortfall: IntGaugeVec,
    pub ip_conflicts: IntGaugeVec,
    pub address_disagreements: IntGaugeVec,
    pub majority_size: IntGaugeVec,
    pub minority_size: IntGaugeVec,
    pub diff_total: IntGaugeVec,

    // sparse per-key gauges
    pub unexpected_ip: IntGaugeVec,
    pub missing_expected_ip: IntGaugeVec,
    pub ip_conflict_claims: IntGaugeVec,
    pub suspect_stale: IntGaugeVec,

    // per-member gauges
    pub member_connected: IntGaugeVec,
    pub member_leader: IntGaugeVec,
    pub member_log_index: IntGaugeVec,
    pub member_index_gap: IntGaugeVec,
    pub member_reporting: IntGaugeVec,
    pub member_missing_reporter: IntGaugeVec,
    pub member_last_msg_age_ms: IntGaugeVec,

    // ops
    pub leader_transitions: IntCounterVec,
    pub last_snapshot_timestamp: GaugeVec,
}

impl MetricFamilies {
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            has_quorum: int_gauge_vec(
                registry,
                "raftwatch_cluster_has_quorum",
                "Whether the largest agreement group reaches quorum (1/0)",
                CLUSTER_LABELS,
            )?,
            all_agree: int_gauge_vec(
                registry,
                "raftwatch_cluster_all_agree",
                "Whether all collected views agree (1/0)",
                CLUSTER_LABELS,
            )?,
            expected_members: int_gauge_vec(
                registry,
                "raftwatch_cluster_expected_members",
                "Expected member count from hints (0 when unknown)",
                CLUSTER_LABELS,
            )?,
            observed_members: int_gauge_vec(
                registry,
                "raftwatch_cluster_observed_members",
                "Distinct member ids referenced by any view",
                CLUSTER_LABELS,
            )?,
            observed_ips: int_gauge_vec(
                registry,
                "raftwatch_cluster_observed_ips",
                "Distinct member IPs referenced by any view",
                CLUSTER_LABELS,
            )?,
            member_excess: int_gauge_vec(
                registry,
                "raftwatch_cluster_member_excess",
                "Members observed above the expected count",
                CLUSTER_LABELS,
            )?,
            member_shortfall: int_gauge_vec(
                registry,
                "raftwatch_cluster_member_shortfall",
                "Members missing below the expected count",
                CLUSTER_LABELS,
            )?,
            ip_conflicts: int_gauge_vec(
                registry,
                "raftwatch_cluster_ip_conflicts",
                "IPs claimed by more than one member id",
                CLUSTER_LABELS,
            )?,
            address_disagreements: int_gauge_vec(
                registry,
                "raftwatch_cluster_address_disagreements",
                "Member ids observed at more than one address",
                CLUSTER_LABELS,
            )?,
            majority_size: int_gauge_vec(
                registry,
                "raftwatch_cluster_majority_size",
                "Number of views in the majority group",
                CLUSTER_LABELS,
            )?,
            minority_size: int_gauge_vec(
                registry,
                "raftwatch_cluster_minority_size",
                "Number of views outside the reference group",
                CLUSTER_LABELS,
            )?,
            diff_total: int_gauge_vec(
                registry,
                "raftwatch_cluster_diff_total",
                "Total divergent entries across all reporters",
                CLUSTER_LABELS,
            )?,
            unexpected_ip: int_gauge_vec(
                registry,
                "raftwatch_cluster_unexpected_ip",
                "Observed IP absent from the expected set",
                IP_LABELS,
            )?,
            missing_expected_ip: int_gauge_vec(
                registry,
                "raftwatch_cluster_missing_expected_ip",
                "Expected IP never observed",
                IP_LABELS,
            )?,
            ip_conflict_claims: int_gauge_vec(
                registry,
                "raftwatch_cluster_ip_conflict_claims",
                "Number of member ids claiming this IP",
                IP_LABELS,
            )?,
            suspect_stale: int_gauge_vec(
                registry,
                "raftwatch_cluster_suspect_stale",
                "Heuristic staleness score of a suspect member",
                MEMBER_LABELS,
            )?,
            member_connected: int_gauge_vec(
                registry,
                "raftwatch_member_connected",
                "Whether the member is considered connected (1/0)",
                MEMBER_LABELS,
            )?,
            member_leader: int_gauge_vec(
                registry,
                "raftwatch_member_leader",
                "Whether the member reports itself leader (1/0)",
                MEMBER_LABELS,
            )?,
            member_log_index: int_gauge_vec(
                registry,
                "raftwatch_member_log_index",
                "The member's local log index",
                MEMBER_LABELS,
            )?,
            member_index_gap: int_gauge_vec(
                registry,
                "raftwatch_member_index_gap",
                "Log index distance behind the current leader",
                MEMBER_LABELS,
            )?,
            member_reporting: int_gauge_vec(
                registry,
                "raftwatch_member_reporting",
                "Whether the member produced its own view this pass (1/0)",
                MEMBER_LABELS,
            )?,
            member_missing_reporter: int_gauge_vec(
                registry,
                "raftwatch_member_missing_reporter",
                "Member referenced by others but never self-reporting (1/0)",
                MEMBER_LABELS,
            )?,
            member_last_msg_age_ms: int_gauge_vec(
                registry,
                "raftwatch_member_last_msg_age_ms",
                "Stalest reported age of the last message from this member",
                MEMBER_LABELS,
            )?,
            leader_transitions: int_counter_vec(
                registry,
                "raftwatch_leader_transitions_total",
                "Observed leader changes per database and cluster instance",
                CLUSTER_LABELS,
            )?,
            last_snapshot_timestamp: gauge_vec(
                registry,
                "raftwatch_last_snapshot_timestamp_seconds",
                "Unix time of the most recent recorded snapshot",
                CLUSTER_LABELS,
            )?,
        })
    }
}

fn int_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn int_counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}
