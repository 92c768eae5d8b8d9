//! Parser for the server-table query response.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::ServerLocalView;

/// A typed reference pair as emitted by the database engine,
/// e.g. `["uuid", "f8328e4b-…"]`.
#[derive(Debug, Deserialize)]
struct RefPair(#[allow(dead_code)] String, String);

impl RefPair {
    fn unwrap_value(self, field: &'static str) -> Result<String> {
        if self.1.is_empty() {
            return Err(Error::EmptyReference(field));
        }
        Ok(self.1)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Row {
    leader: bool,
    connected: bool,
    cid: RefPair,
    sid: RefPair,
    index: i64,
}

/// Parses the raw JSON response of the server-table query into a
/// [`ServerLocalView`].
///
/// # Errors
///
/// Fails on malformed JSON, an empty result set, an engine-reported query
/// error, or a reference pair that unwraps to an empty value.
pub fn parse_local_view(raw: &str) -> Result<ServerLocalView> {
    let results: Vec<QueryResult> = serde_json::from_str(raw.trim())?;
    let result = results.into_iter().next().ok_or(Error::EmptyQueryResult)?;

    if let Some(message) = result.error {
        return Err(Error::Query(message));
    }

    let row = result.rows.into_iter().next().ok_or(Error::NoRows)?;

    Ok(ServerLocalView {
        leader: row.leader,
        connected: row.connected,
        cluster_id: row.cid.unwrap_value("cid")?,
        server_id: row.sid.unwrap_value("sid")?,
        log_index: row.index,
    })
}
