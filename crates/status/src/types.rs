//! Core data model for member health reports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two logical databases served by each cluster member.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Database {
    /// The northbound database.
    Northbound,
    /// The southbound database.
    Southbound,
}

impl Database {
    /// Lowercase label used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Northbound => "northbound",
            Self::Southbound => "southbound",
        }
    }

    /// Engine-side database name, as used in server-table queries.
    #[must_use]
    pub const fn db_name(self) -> &'static str {
        match self {
            Self::Northbound => "Northbound",
            Self::Southbound => "Southbound",
        }
    }

    /// Path of the local control socket for cluster introspection.
    #[must_use]
    pub const fn control_socket(self) -> &'static str {
        match self {
            Self::Northbound => "/var/run/cluster/nb_db.ctl",
            Self::Southbound => "/var/run/cluster/sb_db.ctl",
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member's self-report of its own role in one database.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerLocalView {
    /// Whether this member believes it is the leader.
    pub leader: bool,
    /// Whether this member believes it is connected to the cluster.
    pub connected: bool,
    /// Cluster instance identifier.
    pub cluster_id: String,
    /// This member's own identifier.
    pub server_id: String,
    /// This member's local log index.
    pub log_index: i64,
}

/// One entry in a member's membership table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterServer {
    /// Member identifier (possibly truncated).
    pub id: String,
    /// Transport address, e.g. `ssl:10.0.0.1:6643`.
    pub address: String,
    /// Role string when the report format carries one.
    pub role: Option<String>,
    /// Whether this entry is the reporting member itself.
    pub is_self: bool,
    /// Whether the reporting member considers this entry connected.
    pub connected: bool,
    /// Age of the last message from this server, when reported.
    pub last_msg_age_ms: Option<u64>,
    /// Replication next index, when reported.
    pub next_index: Option<u64>,
    /// Replication match index, when reported.
    pub match_index: Option<u64>,
}

/// A member's full view of the cluster for one database.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Database name from the report header.
    pub name: String,
    /// Role string from the report header.
    pub role: String,
    /// Raft term from the report header.
    pub term: u64,
    /// Log index from the report header.
    pub log_index: u64,
    /// Whether the member reports itself part of the cluster.
    pub connected: bool,
    /// Membership table, in report order.
    pub servers: Vec<ClusterServer>,
}

impl ClusterStatus {
    /// Returns the entry the reporting member marked as itself, if any.
    #[must_use]
    pub fn self_entry(&self) -> Option<&ClusterServer> {
        self.servers.iter().find(|s| s.is_self)
    }
}

/// Bundle of local and full view for one member, one database.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Which database this snapshot describes.
    pub database: Database,
    /// The member's self-report.
    pub local: ServerLocalView,
    /// The member's full cluster view.
    pub status: ClusterStatus,
}
