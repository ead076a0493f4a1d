//! Error types shared by the query builder, the backends and the search engine.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The indexed service could not be reached at all.
    #[error("index backend unreachable: {0}")]
    BackendUnreachable(String),

    /// The backend failed while running a query.
    #[error("index query failed: {0}")]
    Query(String),

    /// The backend timed out and the caller did not ask for partial results.
    #[error("the search timed out after {:.1}s", elapsed.as_secs_f64())]
    Timeout { elapsed: Duration },

    /// A malformed filter or range combination, caught before any work starts.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Malformed traffic on the backend connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// A directory the fallback scanner could not list.
#[derive(Debug, thiserror::Error)]
#[error("cannot list {}: {source}", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl ScanError {
    /// Whether the directory vanished between being discovered and being listed.
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == std::io::ErrorKind::NotFound
    }

    pub fn is_permission_denied(&self) -> bool {
        self.source.kind() == std::io::ErrorKind::PermissionDenied
    }
}
