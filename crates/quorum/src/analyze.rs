//! Fingerprint-based agreement analysis across member views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::view::MemberView;

/// Quorum size for a sample of `n` views.
#[must_use]
pub const fn quorum_size(n: usize) -> usize {
    n / 2 + 1
}

/// Stable fingerprint of a membership map: entries sorted by member id,
/// rendered `id=address`, comma-joined.
#[must_use]
pub fn fingerprint(members: &BTreeMap<String, String>) -> String {
    let entries: Vec<String> = members
        .iter()
        .map(|(id, address)| format!("{id}={address}"))
        .collect();
    entries.join(",")
}

/// An address both sides know under the same id but at different values.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AddressMismatch {
    /// The member id present on both sides.
    pub id: String,
    /// Address according to the truth view.
    pub expected: String,
    /// Address according to the diverging view.
    pub actual: String,
}

/// Difference of one view against the truth view.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemberDiff {
    /// Ids present in the truth view but absent here.
    pub missing: Vec<String>,
    /// Ids present here but absent from the truth view.
    pub extra: Vec<String>,
    /// Ids present in both with differing addresses.
    pub mismatched: Vec<AddressMismatch>,
}

impl MemberDiff {
    /// Whether the view matches the truth exactly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.mismatched.is_empty()
    }

    /// Number of divergent entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.missing.len() + self.extra.len() + self.mismatched.len()
    }
}

/// Agreement outcome across all views for one database instance.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// All views shared one fingerprint.
    pub all_agree: bool,
    /// The largest agreement group reached quorum.
    pub has_majority: bool,
    /// Quorum size for this sample.
    pub quorum: usize,
    /// Reporters inside the majority group (empty without a majority).
    pub majority: Vec<String>,
    /// Reporters outside the reference group.
    pub minority: Vec<String>,
    /// The reference membership map (the majority's when one exists,
    /// otherwise the largest group's, used for diagnostics only).
    pub truth: BTreeMap<String, String>,
    /// Per-reporter diffs against the truth view.
    pub diffs: BTreeMap<String, MemberDiff>,
}

impl ConsensusResult {
    /// Total count of divergent entries across all reporters.
    #[must_use]
    pub fn diff_total(&self) -> usize {
        self.diffs.values().map(MemberDiff::len).sum()
    }
}

/// Groups views by membership fingerprint and determines majority agreement.
#[must_use]
pub fn analyze(views: &[MemberView]) -> ConsensusResult {
    let quorum = quorum_size(views.len());
    let mut result = ConsensusResult {
        quorum,
        ..ConsensusResult::default()
    };

    if views.is_empty() {
        return result;
    }

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, view) in views.iter().enumerate() {
        groups.entry(fingerprint(&view.members)).or_default().push(index);
    }

    if groups.len() == 1 {
        result.all_agree = true;
        result.has_majority = true;
        result.majority = views.iter().map(|v| v.reporter.clone()).collect();
        result.majority.sort();
        result.truth = views[0].members.clone();
        return result;
    }

    // Largest group; ties resolve to the lexicographically first fingerprint.
    let mut group_iter = groups.values();
    let mut reference = group_iter.next().expect("at least one group");
    for indices in group_iter {
        if indices.len() > reference.len() {
            reference = indices;
        }
    }

    result.has_majority = reference.len() >= quorum;
    result.truth = views[reference[0]].members.clone();

    if result.has_majority {
        result.majority = reference.iter().map(|&i| views[i].reporter.clone()).collect();
        result.majority.sort();
    }

    for (index, view) in views.iter().enumerate() {
        if reference.contains(&index) {
            continue;
        }
        result.minority.push(view.reporter.clone());
        result
            .diffs
            .insert(view.reporter.clone(), diff_against(&result.truth, &view.members));
    }
    result.minority.sort();

    result
}

fn diff_against(truth: &BTreeMap<String, String>, members: &BTreeMap<String, String>) -> MemberDiff {
    let mut diff = MemberDiff::default();

    for (id, expected) in truth {
        match members.get(id) {
            None => diff.missing.push(id.clone()),
            Some(actual) if actual != expected => diff.mismatched.push(AddressMismatch {
                id: id.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            }),
            Some(_) => {}
        }
    }

    for id in members.keys() {
        if !truth.contains_key(id) {
            diff.extra.push(id.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(reporter: &str, members: &[(&str, &str)]) -> MemberView {
        MemberView {
            reporter: reporter.to_string(),
            reporter_address: String::new(),
            members: members
                .iter()
                .map(|(id, addr)| ((*id).to_string(), (*addr).to_string()))
                .collect(),
        }
    }

    const MAP: &[(&str, &str)] = &[
        ("a", "ssl:10.0.0.1:6643"),
        ("b", "ssl:10.0.0.2:6643"),
        ("c", "ssl:10.0.0.3:6643"),
    ];

    #[test]
    fn quorum_arithmetic() {
        assert_eq!(quorum_size(0), 1);
        assert_eq!(quorum_size(1), 1);
        assert_eq!(quorum_size(2), 2);
        assert_eq!(quorum_size(3), 2);
        assert_eq!(quorum_size(4), 3);
        assert_eq!(quorum_size(5), 3);
    }

    #[test]
    fn empty_sample_has_no_majority() {
        let result = analyze(&[]);
        assert!(!result.all_agree);
        assert!(!result.has_majority);
        assert_eq!(result.quorum, 1);
    }

    #[test]
    fn unanimous_sample_agrees() {
        let views = vec![view("a", MAP), view("b", MAP), view("c", MAP)];
        let result = analyze(&views);

        assert!(result.all_agree);
        assert!(result.has_majority);
        assert_eq!(result.quorum, 2);
        assert_eq!(result.majority, vec!["a", "b", "c"]);
        assert!(result.minority.is_empty());
        assert!(result.diffs.is_empty());
        assert_eq!(result.diff_total(), 0);
    }

    #[test]
    fn two_against_one_forms_majority() {
        let short: &[(&str, &str)] = &[("a", "ssl:10.0.0.1:6643"), ("b", "ssl:10.0.0.2:6643")];
        let views = vec![view("a", MAP), view("b", MAP), view("c", short)];
        let result = analyze(&views);

        assert!(!result.all_agree);
        assert!(result.has_majority);
        assert_eq!(result.majority, vec!["a", "b"]);
        assert_eq!(result.minority, vec!["c"]);

        let diff = &result.diffs["c"];
        assert_eq!(diff.missing, vec!["c"]);
        assert!(diff.extra.is_empty());
        assert!(diff.mismatched.is_empty());
        assert_eq!(result.diff_total(), 1);
    }

    #[test]
    fn diff_is_antisymmetric() {
        let extra: &[(&str, &str)] = &[
            ("a", "ssl:10.0.0.1:6643"),
            ("b", "ssl:10.0.0.2:6643"),
            ("c", "ssl:10.0.0.3:6643"),
            ("d", "ssl:10.0.0.4:6643"),
        ];
        let views = vec![view("a", MAP), view("b", MAP), view("d", extra)];
        let diff = &analyze(&views).diffs["d"];

        assert_eq!(diff.extra, vec!["d"]);
        assert!(diff.missing.is_empty());
        assert!(!diff.extra.contains(&"c".to_string()));
    }

    #[test]
    fn address_mismatch_is_reported() {
        let moved: &[(&str, &str)] = &[
            ("a", "ssl:10.0.0.1:6643"),
            ("b", "ssl:10.0.0.9:6643"),
            ("c", "ssl:10.0.0.3:6643"),
        ];
        let views = vec![view("a", MAP), view("b", MAP), view("c", moved)];
        let diff = &analyze(&views).diffs["c"];

        assert_eq!(diff.mismatched.len(), 1);
        assert_eq!(diff.mismatched[0].id, "b");
        assert_eq!(diff.mismatched[0].expected, "ssl:10.0.0.2:6643");
        assert_eq!(diff.mismatched[0].actual, "ssl:10.0.0.9:6643");
    }

    #[test]
    fn split_without_quorum_has_no_majority() {
        let other: &[(&str, &str)] = &[("a", "ssl:10.0.0.1:6643")];
        let third: &[(&str, &str)] = &[("b", "ssl:10.0.0.2:6643")];
        let views = vec![view("a", MAP), view("b", other), view("c", third)];
        let result = analyze(&views);

        assert!(!result.all_agree);
        assert!(!result.has_majority);
        assert!(result.majority.is_empty());
        // the two views outside the reference group still get diffs
        assert_eq!(result.minority.len(), 2);
        assert_eq!(result.diffs.len(), 2);
    }
}
