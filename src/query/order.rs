use crate::entry::Entry;
use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Result ordering
///
/// The index sorts with an `ORDER BY` clause. The fallback scanner can't sort
/// while streaming, so it buffers and sorts with [`SortOrder::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    NameAsc,
    NameDesc,
    ModifiedAsc,
    ModifiedDesc,
    SizeAsc,
    SizeDesc,
}

impl SortOrder {
    /// Backend `ORDER BY` clause for this order
    pub fn order_clause(&self) -> &'static str {
        match self {
            SortOrder::NameAsc => "ORDER BY System.FileName ASC",
            SortOrder::NameDesc => "ORDER BY System.FileName DESC",
            SortOrder::ModifiedAsc => "ORDER BY System.DateModified ASC",
            SortOrder::ModifiedDesc => "ORDER BY System.DateModified DESC",
            SortOrder::SizeAsc => "ORDER BY System.Size ASC",
            SortOrder::SizeDesc => "ORDER BY System.Size DESC",
        }
    }

    /// Compare two entries. Ties fall back to the full path so the result is total.
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        let primary = match self {
            SortOrder::NameAsc => compare_names(a, b),
            SortOrder::NameDesc => compare_names(b, a),
            SortOrder::ModifiedAsc => a.modified().cmp(&b.modified()),
            SortOrder::ModifiedDesc => b.modified().cmp(&a.modified()),
            SortOrder::SizeAsc => a.size().cmp(&b.size()),
            SortOrder::SizeDesc => b.size().cmp(&a.size()),
        };
        primary.then_with(|| a.path().cmp(b.path()))
    }

    /// Whether comparing needs the lazy metadata block
    pub fn needs_stat(&self) -> bool {
        !matches!(self, SortOrder::NameAsc | SortOrder::NameDesc)
    }
}

fn compare_names(a: &Entry, b: &Entry) -> Ordering {
    a.name().to_lowercase().cmp(&b.name().to_lowercase())
}

/// Parses `name`, `-name`, `modified`, `-modified`, `size`, `-size`
impl FromStr for SortOrder {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, key) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let order = match (key.to_ascii_lowercase().as_str(), descending) {
            ("name", false) => SortOrder::NameAsc,
            ("name", true) => SortOrder::NameDesc,
            ("modified" | "mtime", false) => SortOrder::ModifiedAsc,
            ("modified" | "mtime", true) => SortOrder::ModifiedDesc,
            ("size", false) => SortOrder::SizeAsc,
            ("size", true) => SortOrder::SizeDesc,
            _ => {
                return Err(SearchError::InvalidQuery(format!("unknown sort order: {}", s)));
            }
        };
        Ok(order)
    }
}
