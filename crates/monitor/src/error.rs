use std::time::Duration;
use thiserror::Error;

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while collecting health snapshots or running the monitor.
#[derive(Debug, Error)]
pub enum Error {
    /// Listing the cluster members failed; the whole pass is aborted.
    #[error("member discovery failed: {0}")]
    Discovery(String),

    /// Executing a command inside a member failed at the transport level.
    #[error("command execution failed: {0}")]
    Exec(String),

    /// A command ran but exited with a non-zero status.
    #[error("command exited with status {code}: {stderr}")]
    CommandStatus {
        /// Process exit code.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A command did not complete within the per-exec deadline.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// A member's response could not be parsed.
    #[error(transparent)]
    Parse(#[from] raftwatch_status::Error),

    /// Setting up the metric catalog failed.
    #[error(transparent)]
    Metrics(#[from] raftwatch_metrics::Error),

    /// The monitor service was started twice.
    #[error("monitor already started")]
    AlreadyStarted,
}
