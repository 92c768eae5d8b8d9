//! Mock collaborators and canned member outputs for integration tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use raftwatch_monitor::{
    CommandRunner, Error, ExecOutput, HintSource, MemberDiscovery, MemberTarget, Result,
};
use raftwatch_quorum::Hints;
use raftwatch_status::Database;

/// Discovery returning a fixed member list.
pub struct StaticDiscovery {
    pub targets: Vec<MemberTarget>,
}

#[async_trait]
impl MemberDiscovery for StaticDiscovery {
    async fn list_members(&self) -> Result<Vec<MemberTarget>> {
        Ok(self.targets.clone())
    }
}

/// Discovery that always fails.
pub struct FailingDiscovery;

#[async_trait]
impl MemberDiscovery for FailingDiscovery {
    async fn list_members(&self) -> Result<Vec<MemberTarget>> {
        Err(Error::Discovery("member list unavailable".to_string()))
    }
}

/// Scripted responses for one member pod. `None` simulates an exec failure.
#[derive(Clone, Default)]
pub struct MemberScript {
    pub local_view: Option<String>,
    pub cluster_status: Option<String>,
}

/// Runner answering from per-pod scripts.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, MemberScript>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pod: &str, script: MemberScript) {
        self.scripts.lock().unwrap().insert(pod.to_string(), script);
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn exec(&self, target: &MemberTarget, command: &[String]) -> Result<ExecOutput> {
        let scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get(&target.pod)
            .ok_or_else(|| Error::Exec(format!("no script for pod {}", target.pod)))?;

        let response = if command.first().map(String::as_str) == Some("db-client") {
            script.local_view.clone()
        } else {
            script.cluster_status.clone()
        };

        response
            .map(|stdout| ExecOutput {
                stdout,
                stderr: String::new(),
                exit_code: 0,
            })
            .ok_or_else(|| Error::Exec("scripted failure".to_string()))
    }
}

/// Hint source returning the same hints for every database.
pub struct StaticHints(pub Hints);

#[async_trait]
impl HintSource for StaticHints {
    async fn hints(&self, _database: Database) -> Option<Hints> {
        Some(self.0.clone())
    }
}

/// A server-table query response for one member.
pub fn local_view_json(cluster_id: &str, server_id: &str, leader: bool, index: i64) -> String {
    format!(
        r#"[{{"rows":[{{"cid":["uuid","{cluster_id}"],"connected":true,"index":{index},"leader":{leader},"sid":["uuid","{server_id}"]}}]}}]"#
    )
}

/// A modern-format cluster-status report. Entries are (short id, address,
/// role); the entry matching `self_short` is marked as self.
pub fn cluster_status_text(self_short: &str, entries: &[(&str, &str, &str)]) -> String {
    let mut text = String::from(
        "Name: Northbound\nStatus: cluster member\nRole: leader\nTerm: 4\nIndex: 27\nServers:\n",
    );
    for (id, address, role) in entries {
        if *id == self_short {
            text.push_str(&format!("    {id} (self) at {address} ({role})\n"));
        } else {
            text.push_str(&format!("    {id} at {address} ({role})\n"));
        }
    }
    text
}
