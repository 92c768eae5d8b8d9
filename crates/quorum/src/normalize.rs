//! Expansion of truncated member identifiers to full identifiers.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use raftwatch_status::{bare_host, canonical_id, is_full_id};

use crate::view::MemberView;

/// Expands truncated identifiers across all views collected in one poll.
///
/// Two lookup aids are learned from the whole sample: a bare-IP to full-id
/// map from each view's self-report, and the set of all full-looking ids.
/// Each id occurrence is then resolved through the address it appears with,
/// falling back to unique-prefix expansion; unresolvable ids stay unchanged
/// and surface as anomalies downstream.
///
/// Returns the mapping of expanded ids (original form to full form).
pub fn normalize_views(views: &mut [MemberView]) -> BTreeMap<String, String> {
    let mut ip_to_id: BTreeMap<String, String> = BTreeMap::new();
    let mut full_ids: BTreeSet<String> = BTreeSet::new();
    let mut expanded: BTreeMap<String, String> = BTreeMap::new();

    for view in views.iter() {
        if is_full_id(&view.reporter) {
            full_ids.insert(view.reporter.clone());
            if !view.reporter_address.is_empty() {
                ip_to_id.insert(bare_host(&view.reporter_address), view.reporter.clone());
            }
        }
        for id in view.members.keys() {
            if is_full_id(id) {
                full_ids.insert(id.clone());
            }
        }
    }

    for view in views.iter_mut() {
        let reporter = expand_id(&view.reporter, &view.reporter_address, &ip_to_id, &full_ids);
        if reporter != view.reporter {
            expanded.insert(view.reporter.clone(), reporter.clone());
            view.reporter = reporter;
        }

        let original = std::mem::take(&mut view.members);
        for (id, address) in original {
            let full = expand_id(&id, &address, &ip_to_id, &full_ids);
            if full != id {
                expanded.insert(id, full.clone());
            }
            // Colliding keys resolve last-writer-wins.
            view.members.insert(full, address);
        }
    }

    expanded
}

/// Expands `id` to the unique known full id sharing its canonical prefix.
///
/// Returns `None` when zero or more than one candidate matches.
#[must_use]
pub fn expand_unique_prefix(id: &str, full_ids: &BTreeSet<String>) -> Option<String> {
    let prefix = canonical_id(id);
    if prefix.is_empty() {
        return None;
    }

    let mut matches = full_ids
        .iter()
        .filter(|full| canonical_id(full).starts_with(&prefix));

    match (matches.next(), matches.next()) {
        (Some(full), None) => Some(full.clone()),
        _ => None,
    }
}

fn expand_id(
    id: &str,
    address: &str,
    ip_to_id: &BTreeMap<String, String>,
    full_ids: &BTreeSet<String>,
) -> String {
    if is_full_id(id) {
        return id.to_string();
    }

    if !address.is_empty() {
        if let Some(full) = ip_to_id.get(&bare_host(address)) {
            debug!(id, %full, "expanded member id via address");
            return full.clone();
        }
    }

    if let Some(full) = expand_unique_prefix(id, full_ids) {
        debug!(id, %full, "expanded member id via unique prefix");
        return full;
    }

    id.to_string()
}
