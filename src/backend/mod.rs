//! Indexed search backends
//!
//! The index service is an external collaborator. This module pins down the
//! narrow contract the search engine relies on:
//!
//! - [`IndexedBackend::connect`] opens one session per search call. Failing
//!   to connect means the service is unreachable and every root falls back
//!   to a live scan.
//! - [`BackendSession::execute`] runs one query and returns a lazy stream of
//!   [`RowEvent`]s: rows, then at most one terminal timeout or failure.
//!
//! Implementations:
//! - `client::SocketBackend` (Unix only) talks to a running index service
//! - [`memory::MemoryBackend`] answers from an in-process row set

#[cfg(unix)]
pub mod client;
pub mod memory;
pub mod protocol;

#[cfg(unix)]
pub use client::{default_socket_path, SocketBackend};
pub use memory::MemoryBackend;

use crate::entry::{Attributes, EntryKind, ImageSize};
use crate::error::Result;
use crate::query::SearchQuery;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Item type the index reports for directories
pub const DIRECTORY_ITEM_TYPE: &str = "Directory";

/// One result row from the index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub path: String,
    /// `"Directory"` for directories, otherwise the file's type
    pub item_type: String,
    pub size: u64,
    pub attributes: u32,
    pub accessed: Option<String>,
    pub modified: Option<String>,
    pub created: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Row {
    pub fn kind(&self) -> EntryKind {
        if self.item_type == DIRECTORY_ITEM_TYPE || Attributes(self.attributes).is_directory() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Dimensions, when the index reported both as non-zero
    pub fn image_size(&self) -> Option<ImageSize> {
        match (self.width, self.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => {
                Some(ImageSize { width, height })
            }
            _ => None,
        }
    }
}

/// What a query is for. Backends that can't parse the query text can
/// evaluate the structured form instead.
#[derive(Debug, Clone, Copy)]
pub enum QueryScope<'a> {
    Search(&'a SearchQuery),
    Probe(&'a Path),
}

/// A query ready to send to a backend
#[derive(Debug, Clone)]
pub struct IndexQuery<'a> {
    /// Query text in the backend dialect
    pub text: String,
    /// Timeout in seconds, 0 for none
    pub timeout_secs: u64,
    /// Maximum number of rows, if limited
    pub limit: Option<usize>,
    pub scope: QueryScope<'a>,
}

/// Item of a backend row stream
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    Row(Row),
    /// The backend gave up because the query timeout expired
    TimedOut,
    /// The backend failed mid-query
    Failed(String),
}

/// Lazy sequence of row events. Ends after the last row or after the first
/// `TimedOut` / `Failed`.
pub type RowStream = Box<dyn Iterator<Item = RowEvent> + Send>;

/// A connection to the index, owned by a single search call
pub trait BackendSession: Send {
    /// Start a query. An `Err` here is a query failure, not unreachability.
    fn execute(&mut self, query: &IndexQuery<'_>) -> Result<RowStream>;

    /// Whether this backend reports timeouts as [`RowEvent::TimedOut`].
    ///
    /// Backends that return `false` only produce a generic failure when a
    /// query runs out of time; the caller then falls back to comparing the
    /// elapsed time against the timeout.
    fn signals_timeouts(&self) -> bool {
        true
    }
}

/// An index service that sessions can be opened against
pub trait IndexedBackend: Send + Sync {
    /// Open a session. Errors mean the service is unreachable.
    fn connect(&self) -> Result<Box<dyn BackendSession>>;
}
