//! Normalized membership view derived from a health snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use raftwatch_status::HealthSnapshot;

/// One member's membership map, keyed by member id.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemberView {
    /// Identifier of the member that produced this view.
    pub reporter: String,
    /// The reporter's own transport address, when its view contains one.
    pub reporter_address: String,
    /// Membership map: member id to transport address.
    pub members: BTreeMap<String, String>,
}

impl MemberView {
    /// Derives a view from one member's health snapshot.
    ///
    /// The reporter id comes from the local self-report (always a full id);
    /// the reporter address from the self entry of the membership table.
    #[must_use]
    pub fn from_snapshot(snapshot: &HealthSnapshot) -> Self {
        let reporter_address = snapshot
            .status
            .self_entry()
            .map(|entry| entry.address.clone())
            .unwrap_or_default();

        let members = snapshot
            .status
            .servers
            .iter()
            .map(|server| (server.id.clone(), server.address.clone()))
            .collect();

        Self {
            reporter: snapshot.local.server_id.clone(),
            reporter_address,
            members,
        }
    }
}
