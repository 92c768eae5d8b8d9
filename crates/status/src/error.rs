use thiserror::Error;

/// Result type for status parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing a member's health reports.
#[derive(Debug, Error)]
pub enum Error {
    /// The server-table query response was not valid JSON.
    #[error("malformed query response: {0}")]
    Json(#[from] serde_json::Error),

    /// The query response carried no result objects.
    #[error("query response contained no results")]
    EmptyQueryResult,

    /// The database engine reported a query-level error.
    #[error("server query failed: {0}")]
    Query(String),

    /// The query result carried no rows for the requested database.
    #[error("query response contained no rows")]
    NoRows,

    /// A typed reference pair unwrapped to an empty value.
    #[error("reference pair for `{0}` is empty")]
    EmptyReference(&'static str),

    /// The cluster-status output had no server list section.
    #[error("cluster status output has no server list section")]
    NoServerSection,
}
