//! Collaborator contracts: member discovery, remote execution, hints.

use async_trait::async_trait;
use std::fmt;

use raftwatch_quorum::Hints;
use raftwatch_status::Database;

use crate::error::Result;

/// A discovered cluster member pod.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MemberTarget {
    /// Pod name.
    pub pod: String,
    /// Container to execute in, when the pod has more than one.
    pub container: Option<String>,
}

impl MemberTarget {
    /// Creates a target addressing the pod's default container.
    pub fn new(pod: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            container: None,
        }
    }
}

impl fmt::Display for MemberTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{}/{container}", self.pod),
            None => f.write_str(&self.pod),
        }
    }
}

/// Captured output of one remote command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command exited cleanly.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Lists the member pods of the watched group.
#[async_trait]
pub trait MemberDiscovery: Send + Sync {
    /// Returns the current member targets.
    ///
    /// # Errors
    ///
    /// A discovery error is fatal for the pass.
    async fn list_members(&self) -> Result<Vec<MemberTarget>>;
}

/// Executes a command inside a member pod.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` in `target`, capturing output and exit code.
    ///
    /// # Errors
    ///
    /// Transport-level failures; non-zero exits are returned as output.
    async fn exec(&self, target: &MemberTarget, command: &[String]) -> Result<ExecOutput>;
}

/// Supplies expectations about the intended cluster composition.
#[async_trait]
pub trait HintSource: Send + Sync {
    /// Hints for one database, when available this poll.
    async fn hints(&self, database: Database) -> Option<Hints>;
}
