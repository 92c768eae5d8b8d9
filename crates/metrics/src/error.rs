use thiserror::Error;

/// Result type for metrics setup.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up the metric catalog.
#[derive(Debug, Error)]
pub enum Error {
    /// Creating or registering a metric family failed.
    #[error("failed to register metric: {0}")]
    Register(#[from] prometheus::Error),
}
