//! Hint-aware extended diagnostics layered over the consensus result.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use raftwatch_status::bare_host;

use crate::analyze::{ConsensusResult, analyze};
use crate::view::MemberView;

/// Score added when a member's representative IP is outside the expected set.
const SCORE_UNEXPECTED_IP: u64 = 1000;
/// Score added when a member never produced its own view.
const SCORE_NOT_REPORTER: u64 = 100;
/// Numerator of the scarce-reference component (fewer references score
/// higher, capped at this value).
const SCORE_REFERENCE_NUMERATOR: u64 = 10;

/// External expectation about the intended cluster composition.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Hints {
    /// Explicit expected replica count, when known.
    pub expected_replicas: Option<usize>,
    /// Expected member IPs, mapped to a human-readable label.
    pub expected_ips: BTreeMap<String, String>,
}

impl Hints {
    /// Effective expected replica count: the explicit count when given,
    /// otherwise the number of expected IPs.
    #[must_use]
    pub fn expected_count(&self) -> Option<usize> {
        self.expected_replicas.or_else(|| {
            if self.expected_ips.is_empty() {
                None
            } else {
                Some(self.expected_ips.len())
            }
        })
    }
}

/// A member suspected stale, with its heuristic score.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Suspect {
    /// Member identifier.
    pub id: String,
    /// Heuristic staleness score (higher is more suspect).
    pub score: u64,
}

/// Consensus result plus IP-aware diagnostics for one database instance.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExtendedConsensusResult {
    /// The underlying agreement analysis.
    pub consensus: ConsensusResult,
    /// Union of all member ids referenced by any view.
    pub member_ids: BTreeSet<String>,
    /// Union of all bare IPs referenced by any view.
    pub ips: BTreeSet<String>,
    /// Members that produced their own view.
    pub reporters: BTreeSet<String>,
    /// Members referenced by someone but never self-reporting.
    pub missing_reporters: BTreeSet<String>,
    /// Observed IPs absent from the expected set.
    pub unexpected_ips: BTreeSet<String>,
    /// Expected IPs never observed.
    pub missing_expected_ips: BTreeSet<String>,
    /// IPs claimed by more than one member id.
    pub ip_conflicts: BTreeMap<String, BTreeSet<String>>,
    /// Member ids observed at more than one distinct address, with the count.
    pub address_disagreements: BTreeMap<String, usize>,
    /// Effective expected replica count.
    pub expected_replicas: Option<usize>,
    /// More members observed than expected.
    pub too_many_members: bool,
    /// Fewer members observed than expected.
    pub too_few_members: bool,
    /// Numeric excess over the expected count.
    pub excess: usize,
    /// Numeric shortfall under the expected count.
    pub shortfall: usize,
    /// Ranked stale suspects; empty without positive staleness evidence.
    pub suspect_stale: Vec<Suspect>,
}

/// Runs the consensus analysis and layers IP-based expectations on top.
#[must_use]
pub fn analyze_extended(views: &[MemberView], hints: Option<&Hints>) -> ExtendedConsensusResult {
    let mut result = ExtendedConsensusResult {
        consensus: analyze(views),
        ..ExtendedConsensusResult::default()
    };

    let mut member_ids: BTreeSet<String> = BTreeSet::new();
    let mut ips: BTreeSet<String> = BTreeSet::new();
    // id -> address -> observation count
    let mut addresses: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    // ip -> claiming ids
    let mut ip_claims: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    // id -> reference count across all views
    let mut references: BTreeMap<String, u64> = BTreeMap::new();

    {
        let mut note = |id: &str, address: &str| {
            member_ids.insert(id.to_string());
            *references.entry(id.to_string()).or_default() += 1;
            if address.is_empty() {
                return;
            }
            let ip = bare_host(address);
            ips.insert(ip.clone());
            *addresses
                .entry(id.to_string())
                .or_default()
                .entry(address.to_string())
                .or_default() += 1;
            ip_claims.entry(ip).or_default().insert(id.to_string());
        };

        for view in views {
            note(&view.reporter, &view.reporter_address);
            for (id, address) in &view.members {
                note(id, address);
            }
        }
    }

    result.member_ids = member_ids;
    result.ips = ips;
    result.reporters = views.iter().map(|view| view.reporter.clone()).collect();
    result.missing_reporters = result
        .member_ids
        .difference(&result.reporters)
        .cloned()
        .collect();

    result.ip_conflicts = ip_claims
        .into_iter()
        .filter(|(_, claimants)| claimants.len() > 1)
        .collect();

    result.address_disagreements = addresses
        .iter()
        .filter(|(_, observed)| observed.len() > 1)
        .map(|(id, observed)| (id.clone(), observed.len()))
        .collect();

    let expected_ips: BTreeSet<String> = hints
        .map(|h| h.expected_ips.keys().cloned().collect())
        .unwrap_or_default();

    if !expected_ips.is_empty() {
        result.unexpected_ips = result.ips.difference(&expected_ips).cloned().collect();
        result.missing_expected_ips = expected_ips.difference(&result.ips).cloned().collect();
    }

    result.expected_replicas = hints.and_then(Hints::expected_count);
    if let Some(expected) = result.expected_replicas {
        let observed = result.member_ids.len();
        result.too_many_members = observed > expected;
        result.too_few_members = observed < expected;
        result.excess = observed.saturating_sub(expected);
        result.shortfall = expected.saturating_sub(observed);
    }

    let staleness_evidence = result.too_many_members
        || !result.unexpected_ips.is_empty()
        || !result.ip_conflicts.is_empty();
    if staleness_evidence {
        let suspects = rank_suspects(&result, &addresses, &references, &expected_ips);
        result.suspect_stale = suspects;
    }

    result
}

fn rank_suspects(
    result: &ExtendedConsensusResult,
    addresses: &BTreeMap<String, BTreeMap<String, usize>>,
    references: &BTreeMap<String, u64>,
    expected_ips: &BTreeSet<String>,
) -> Vec<Suspect> {
    let mut suspects: Vec<Suspect> = result
        .member_ids
        .iter()
        .map(|id| {
            let mut score = 0;

            let expected_ip = representative_address(addresses.get(id))
                .map(|address| expected_ips.contains(&bare_host(address)))
                .unwrap_or(false);
            if !expected_ip {
                score += SCORE_UNEXPECTED_IP;
            }

            if !result.reporters.contains(id) {
                score += SCORE_NOT_REPORTER;
            }

            let referenced = references.get(id).copied().unwrap_or(1).max(1);
            score += SCORE_REFERENCE_NUMERATOR / referenced;

            Suspect {
                id: id.clone(),
                score,
            }
        })
        .collect();

    // Descending score, ties by ascending id (already ascending from the set).
    suspects.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

    if result.excess > 0 {
        suspects.truncate(result.excess);
    }
    suspects
}

/// Most frequently observed address for a member, ties by ascending address.
fn representative_address(observed: Option<&BTreeMap<String, usize>>) -> Option<&String> {
    let observed = observed?;
    let mut best: Option<(&String, usize)> = None;
    for (address, count) in observed {
        match best {
            Some((_, best_count)) if *count <= best_count => {}
            _ => best = Some((address, *count)),
        }
    }
    best.map(|(address, _)| address)
}

impl ExtendedConsensusResult {
    /// Renders a deterministic human-readable block for the live feed.
    #[must_use]
    pub fn render(&self, heading: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== {heading} ==");
        let _ = writeln!(
            out,
            "agreement: {}",
            if self.consensus.all_agree {
                "full"
            } else if self.consensus.has_majority {
                "majority"
            } else {
                "none"
            }
        );
        let _ = writeln!(
            out,
            "quorum: {} (majority {}, minority {})",
            self.consensus.quorum,
            self.consensus.majority.len(),
            self.consensus.minority.len()
        );
        let _ = writeln!(
            out,
            "members: observed {}, reporting {}{}",
            self.member_ids.len(),
            self.reporters.len(),
            self.expected_replicas
                .map(|e| format!(", expected {e}"))
                .unwrap_or_default()
        );

        if self.too_many_members {
            let _ = writeln!(out, "too many members: excess {}", self.excess);
        }
        if self.too_few_members {
            let _ = writeln!(out, "too few members: shortfall {}", self.shortfall);
        }
        if !self.missing_reporters.is_empty() {
            let _ = writeln!(out, "not reporting: {}", join(&self.missing_reporters));
        }
        if !self.unexpected_ips.is_empty() {
            let _ = writeln!(out, "unexpected ips: {}", join(&self.unexpected_ips));
        }
        if !self.missing_expected_ips.is_empty() {
            let _ = writeln!(out, "missing expected ips: {}", join(&self.missing_expected_ips));
        }
        for (ip, claimants) in &self.ip_conflicts {
            let _ = writeln!(out, "ip conflict: {ip} claimed by {}", join(claimants));
        }
        for (id, count) in &self.address_disagreements {
            let _ = writeln!(out, "address disagreement: {id} seen at {count} addresses");
        }
        for (reporter, diff) in &self.consensus.diffs {
            let _ = writeln!(
                out,
                "divergent view from {reporter}: {} missing, {} extra, {} mismatched",
                diff.missing.len(),
                diff.extra.len(),
                diff.mismatched.len()
            );
        }
        for suspect in &self.suspect_stale {
            let _ = writeln!(out, "suspect stale: {} (score {})", suspect.id, suspect.score);
        }
        out
    }
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().cloned().collect::<Vec<_>>().join(", ")
}
