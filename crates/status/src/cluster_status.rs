//! Parser for the semi-structured cluster-status report.
//!
//! Two historical formats for member lines exist; each gets its own line
//! grammar and the dispatcher tries them in turn. Lines matching neither are
//! ignored.

use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::{ClusterServer, ClusterStatus};

/// Last-message age above which a legacy-format entry counts as disconnected.
pub const DEFAULT_FRESHNESS_MS: u64 = 10_000;

const SERVER_SECTION_HEADER: &str = "Servers:";
const DISCONNECTED_ROLE: &str = "disconnected";

// `<id> [(self)] at <address> (<role>)`
static MODERN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<id>\S+)(?P<slf> \(self\))? at (?P<addr>\S+) \((?P<role>[a-z]+)\)$").unwrap()
});

// `<id> (<id> at <address>) [(self)] [next_index=<n> match_index=<n>] [last msg <n> ms ago]`
static LEGACY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<id>\S+) \(\S+ at (?P<addr>\S+)\)(?P<slf> \(self\))?( next_index=(?P<next>\d+) match_index=(?P<match>\d+))?( last msg (?P<age>\d+) ms ago)?$",
    )
    .unwrap()
});

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<key>[A-Za-z ]+):\s*(?P<value>.*)$").unwrap());

/// Parses the raw cluster-status text for one database.
///
/// Header fields are collected best-effort; the member list is required and
/// its absence is the only parse failure. `freshness_threshold_ms` bounds how
/// old a legacy entry's last message may be before the entry counts as
/// disconnected.
///
/// # Errors
///
/// Returns [`Error::NoServerSection`] when the member-list section is absent.
pub fn parse_cluster_status(raw: &str, freshness_threshold_ms: u64) -> Result<ClusterStatus> {
    let mut status = ClusterStatus::default();
    let mut in_servers = false;
    let mut seen_servers = false;

    for line in raw.lines() {
        if in_servers {
            if line.starts_with(char::is_whitespace) {
                if let Some(server) = parse_member_line(line.trim_end(), freshness_threshold_ms) {
                    status.servers.push(server);
                } else if !line.trim().is_empty() {
                    trace!(line, "ignoring unrecognized member line");
                }
                continue;
            }
            in_servers = false;
        }

        let trimmed = line.trim_end();
        if trimmed == SERVER_SECTION_HEADER {
            in_servers = true;
            seen_servers = true;
            continue;
        }
        parse_header_line(trimmed, &mut status);
    }

    if !seen_servers {
        return Err(Error::NoServerSection);
    }
    Ok(status)
}

fn parse_header_line(line: &str, status: &mut ClusterStatus) {
    let Some(caps) = HEADER_LINE.captures(line) else {
        return;
    };
    let value = caps["value"].trim();
    match &caps["key"] {
        "Name" => status.name = value.to_string(),
        "Role" => status.role = value.to_string(),
        "Term" => status.term = value.parse().unwrap_or_default(),
        "Index" => status.log_index = value.parse().unwrap_or_default(),
        "Status" => status.connected = !value.contains(DISCONNECTED_ROLE),
        _ => {}
    }
}

fn parse_member_line(line: &str, freshness_threshold_ms: u64) -> Option<ClusterServer> {
    let line = line.trim_start();

    if let Some(caps) = MODERN_LINE.captures(line) {
        let role = caps["role"].to_string();
        return Some(ClusterServer {
            id: caps["id"].to_string(),
            address: caps["addr"].to_string(),
            connected: role != DISCONNECTED_ROLE,
            role: Some(role),
            is_self: caps.name("slf").is_some(),
            last_msg_age_ms: None,
            next_index: None,
            match_index: None,
        });
    }

    if let Some(caps) = LEGACY_LINE.captures(line) {
        let is_self = caps.name("slf").is_some();
        let next_index = caps.name("next").and_then(|m| m.as_str().parse().ok());
        let match_index = caps.name("match").and_then(|m| m.as_str().parse().ok());
        let last_msg_age_ms: Option<u64> = caps.name("age").and_then(|m| m.as_str().parse().ok());

        // Connectivity inference ladder: explicit message age, then self,
        // then presence of replication indices.
        let connected = match last_msg_age_ms {
            Some(age) => age <= freshness_threshold_ms,
            None if is_self => true,
            None => next_index.is_some() || match_index.is_some(),
        };

        return Some(ClusterServer {
            id: caps["id"].to_string(),
            address: caps["addr"].to_string(),
            role: None,
            is_self,
            connected,
            last_msg_age_ms,
            next_index,
            match_index,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const MODERN: &str = "\
1b9a
Name: Northbound
Cluster ID: f832 (f8328e4b-9a6e-4f28-8f28-bb3ea273ecd6)
Server ID: 1b9a (1b9a7b27-8e31-4da5-b2d8-d2e94c0ecf13)
Address: ssl:10.0.0.1:6643
Status: cluster member
Role: leader
Term: 4
Index: 27
Servers:
    1b9a (self) at ssl:10.0.0.1:6643 (leader)
    b007 at ssl:10.0.0.2:6643 (follower)
    dead at ssl:10.0.0.3:6643 (disconnected)
";

    const LEGACY: &str = "\
Name: Northbound
Status: cluster member
Role: leader
Term: 4
Index: 27
Servers:
    1b9a (1b9a at ssl:10.0.0.1:6643) (self) next_index=4 match_index=3
    b007 (b007 at ssl:10.0.0.2:6643) next_index=4 match_index=3 last msg 500 ms ago
    dead (dead at ssl:10.0.0.3:6643) last msg 60000 ms ago
    cafe (cafe at ssl:10.0.0.4:6643)
Election timer: 1000
";

    #[test]
    fn parses_modern_format() {
        let status = parse_cluster_status(MODERN, DEFAULT_FRESHNESS_MS).unwrap();
        assert_eq!(status.name, "Northbound");
        assert_eq!(status.role, "leader");
        assert_eq!(status.term, 4);
        assert_eq!(status.log_index, 27);
        assert!(status.connected);
        assert_eq!(status.servers.len(), 3);

        let me = &status.servers[0];
        assert!(me.is_self);
        assert!(me.connected);
        assert_eq!(me.address, "ssl:10.0.0.1:6643");
        assert_eq!(me.role.as_deref(), Some("leader"));

        assert!(status.servers[1].connected);
        assert!(!status.servers[2].connected);
    }

    #[test]
    fn parses_legacy_format() {
        let status = parse_cluster_status(LEGACY, DEFAULT_FRESHNESS_MS).unwrap();
        assert_eq!(status.servers.len(), 4);

        // self is always connected
        assert!(status.servers[0].is_self);
        assert!(status.servers[0].connected);
        assert_eq!(status.servers[0].next_index, Some(4));
        assert_eq!(status.servers[0].match_index, Some(3));

        // fresh last msg wins
        assert!(status.servers[1].connected);
        assert_eq!(status.servers[1].last_msg_age_ms, Some(500));

        // stale last msg overrides everything else
        assert!(!status.servers[2].connected);

        // no age, not self, no indices
        assert!(!status.servers[3].connected);
    }

    #[test]
    fn explicit_age_beats_replication_indices() {
        let raw = "Servers:\n    dead (dead at ssl:10.0.0.3:6643) next_index=4 match_index=3 last msg 60000 ms ago\n";
        let status = parse_cluster_status(raw, DEFAULT_FRESHNESS_MS).unwrap();
        assert!(!status.servers[0].connected);
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let raw = "Servers:\n    something entirely unexpected\n    1b9a (self) at ssl:10.0.0.1:6643 (leader)\n";
        let status = parse_cluster_status(raw, DEFAULT_FRESHNESS_MS).unwrap();
        assert_eq!(status.servers.len(), 1);
    }

    #[test]
    fn missing_section_is_an_error() {
        assert_matches!(
            parse_cluster_status("Name: Northbound\n", DEFAULT_FRESHNESS_MS),
            Err(Error::NoServerSection)
        );
    }

    #[test]
    fn section_ends_at_first_unindented_line() {
        let status = parse_cluster_status(LEGACY, DEFAULT_FRESHNESS_MS).unwrap();
        // "Election timer" must not leak into the server list.
        assert!(status.servers.iter().all(|s| !s.id.contains("Election")));
    }

    #[test]
    fn empty_server_section_is_tolerated() {
        let status = parse_cluster_status("Servers:\n", DEFAULT_FRESHNESS_MS).unwrap();
        assert!(status.servers.is_empty());
    }
}
