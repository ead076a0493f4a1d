//! Search queries
//!
//! A [`SearchQuery`] is built once per search call with [`QueryBuilder`] and is
//! immutable afterwards. Validation happens in [`QueryBuilder::build`], before
//! any backend is touched.

pub mod filters;
pub mod order;
pub mod sql;

pub use filters::{DimensionFilter, ListingFilter, MediaType, Range};
pub use order::SortOrder;
pub use sql::{escape_sql, render_probe, render_query};

use crate::error::{Result, SearchError};
use crate::utils::{paths_overlap, split_tokens};
use std::path::{Path, PathBuf};

/// A validated search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    roots: Vec<PathBuf>,
    exact_path: Option<PathBuf>,
    recurse: bool,
    filename: Option<String>,
    substring_tokens: Vec<String>,
    content_text: Option<String>,
    media_type: Option<MediaType>,
    total_pixels: Option<Range<u64>>,
    aspect_ratio: Option<Range<f64>>,
    include_files: bool,
    include_dirs: bool,
    order: Option<SortOrder>,
    timeout_secs: Option<u64>,
}

impl SearchQuery {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Requested roots. Empty for an exact-path query.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn exact_path(&self) -> Option<&Path> {
        self.exact_path.as_deref()
    }

    /// The paths results are reported against: the roots, or the exact path.
    pub fn search_roots(&self) -> Vec<PathBuf> {
        match &self.exact_path {
            Some(path) => vec![path.clone()],
            None => self.roots.clone(),
        }
    }

    pub fn recurse(&self) -> bool {
        self.recurse
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Whitespace-separated substring tokens; all must match
    pub fn substring_tokens(&self) -> &[String] {
        &self.substring_tokens
    }

    pub fn content_text(&self) -> Option<&str> {
        self.content_text.as_deref()
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.media_type
    }

    pub fn total_pixels(&self) -> Option<Range<u64>> {
        self.total_pixels
    }

    pub fn aspect_ratio(&self) -> Option<Range<f64>> {
        self.aspect_ratio
    }

    pub fn include_files(&self) -> bool {
        self.include_files
    }

    pub fn include_dirs(&self) -> bool {
        self.include_dirs
    }

    pub fn order(&self) -> Option<SortOrder> {
        self.order
    }

    /// The timeout the caller asked for: None for the backend default, 0 for none
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    /// Whether a timeout is reported as a stream item rather than an error.
    ///
    /// Only callers that chose a timeout get partial results.
    pub fn reports_timeouts(&self) -> bool {
        self.timeout_secs.is_some()
    }

    /// Timeout to send to the backend (0 = unlimited)
    pub fn effective_timeout_secs(&self, default_secs: u64) -> u64 {
        self.timeout_secs.unwrap_or(default_secs)
    }

    /// Filters the fallback scanner cannot apply, by name
    pub fn unsupported_in_fallback(&self) -> Vec<&'static str> {
        let mut unsupported = Vec::new();
        if self.content_text.is_some() {
            unsupported.push("content text");
        }
        if self.total_pixels.is_some() {
            unsupported.push("total pixels");
        }
        if self.aspect_ratio.is_some() {
            unsupported.push("aspect ratio");
        }
        unsupported
    }
}

/// Builder for [`SearchQuery`]
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    roots: Vec<PathBuf>,
    exact_path: Option<PathBuf>,
    recurse: bool,
    filename: Option<String>,
    substring: Option<String>,
    content_text: Option<String>,
    media_type: Option<MediaType>,
    total_pixels: Option<Range<u64>>,
    aspect_ratio: Option<Range<f64>>,
    include_files: bool,
    include_dirs: bool,
    order: Option<SortOrder>,
    timeout_secs: Option<u64>,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            exact_path: None,
            recurse: true,
            filename: None,
            substring: None,
            content_text: None,
            media_type: None,
            total_pixels: None,
            aspect_ratio: None,
            include_files: true,
            include_dirs: true,
            order: None,
            timeout_secs: None,
        }
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Look up a single path instead of searching roots
    pub fn exact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.exact_path = Some(path.into());
        self
    }

    pub fn recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn substring(mut self, substring: impl Into<String>) -> Self {
        self.substring = Some(substring.into());
        self
    }

    pub fn content_text(mut self, text: impl Into<String>) -> Self {
        self.content_text = Some(text.into());
        self
    }

    pub fn media_type(mut self, media: MediaType) -> Self {
        self.media_type = Some(media);
        self
    }

    pub fn total_pixels(mut self, range: Range<u64>) -> Self {
        self.total_pixels = Some(range);
        self
    }

    pub fn aspect_ratio(mut self, range: Range<f64>) -> Self {
        self.aspect_ratio = Some(range);
        self
    }

    pub fn include_files(mut self, include: bool) -> Self {
        self.include_files = include;
        self
    }

    pub fn include_dirs(mut self, include: bool) -> Self {
        self.include_dirs = include;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// Explicit timeout in seconds; 0 disables the timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Validate and freeze the query
    pub fn build(self) -> Result<SearchQuery> {
        match (&self.exact_path, self.roots.is_empty()) {
            (None, true) => {
                return Err(SearchError::InvalidQuery(
                    "a query needs at least one root or an exact path".to_string(),
                ));
            }
            (Some(_), false) => {
                return Err(SearchError::InvalidQuery(
                    "roots and an exact path are mutually exclusive".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(path) = &self.exact_path {
            if !path.is_absolute() {
                return Err(SearchError::InvalidQuery(format!(
                    "exact path must be absolute: {}",
                    path.display()
                )));
            }
        }

        let mut roots: Vec<PathBuf> = Vec::with_capacity(self.roots.len());
        for root in self.roots {
            if !root.is_absolute() {
                return Err(SearchError::InvalidQuery(format!(
                    "root must be absolute: {}",
                    root.display()
                )));
            }
            if roots.contains(&root) {
                continue;
            }
            // Results must belong to exactly one root
            if let Some(other) = roots.iter().find(|other| paths_overlap(other, &root)) {
                return Err(SearchError::InvalidQuery(format!(
                    "roots {} and {} overlap",
                    other.display(),
                    root.display()
                )));
            }
            roots.push(root);
        }

        if !self.include_files && !self.include_dirs {
            return Err(SearchError::InvalidQuery(
                "excluding both files and directories matches nothing".to_string(),
            ));
        }

        if let Some(range) = &self.total_pixels {
            range.validate("total pixels")?;
        }
        if let Some(range) = &self.aspect_ratio {
            range.validate("aspect ratio")?;
        }

        if let Some(name) = &self.filename {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(SearchError::InvalidQuery(format!("invalid file name {:?}", name)));
            }
        }

        let substring_tokens = self.substring.as_deref().map(split_tokens).unwrap_or_default();
        let content_text = self.content_text.filter(|t| !t.trim().is_empty());

        Ok(SearchQuery {
            roots,
            exact_path: self.exact_path,
            recurse: self.recurse,
            filename: self.filename,
            substring_tokens,
            content_text,
            media_type: self.media_type,
            total_pixels: self.total_pixels,
            aspect_ratio: self.aspect_ratio,
            include_files: self.include_files,
            include_dirs: self.include_dirs,
            order: self.order,
            timeout_secs: self.timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_roots_or_exact_path() {
        assert!(QueryBuilder::new().build().is_err());
        assert!(QueryBuilder::new().root("/a").exact_path("/a/b.jpg").build().is_err());
        assert!(QueryBuilder::new().exact_path("/a/b.jpg").build().is_ok());
    }

    #[test]
    fn test_rejects_relative_and_overlapping_roots() {
        assert!(QueryBuilder::new().root("photos").build().is_err());
        assert!(QueryBuilder::new().root("/a").root("/a/b").build().is_err());
        assert!(QueryBuilder::new().root("/a/b").root("/a").build().is_err());
    }

    #[test]
    fn test_duplicate_roots_collapse() {
        let q = QueryBuilder::new().root("/a").root("/b").root("/a").build().unwrap();
        assert_eq!(q.roots(), &[PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_rejects_bad_filters() {
        assert!(QueryBuilder::new()
            .root("/a")
            .include_files(false)
            .include_dirs(false)
            .build()
            .is_err());
        assert!(QueryBuilder::new()
            .root("/a")
            .aspect_ratio(Range::new(Some(2.0), Some(1.0)))
            .build()
            .is_err());
        assert!(QueryBuilder::new().root("/a").filename("a/b").build().is_err());
    }

    #[test]
    fn test_substring_tokens() {
        let q = QueryBuilder::new().root("/a").substring(" sunset  beach ").build().unwrap();
        assert_eq!(q.substring_tokens(), &["sunset".to_string(), "beach".to_string()]);

        let blank = QueryBuilder::new().root("/a").substring("   ").build().unwrap();
        assert!(blank.substring_tokens().is_empty());
    }

    #[test]
    fn test_timeout_semantics() {
        let default = QueryBuilder::new().root("/a").build().unwrap();
        assert!(!default.reports_timeouts());
        assert_eq!(default.effective_timeout_secs(10), 10);

        let unlimited = QueryBuilder::new().root("/a").timeout_secs(0).build().unwrap();
        assert!(unlimited.reports_timeouts());
        assert_eq!(unlimited.effective_timeout_secs(10), 0);

        let explicit = QueryBuilder::new().root("/a").timeout_secs(3).build().unwrap();
        assert_eq!(explicit.effective_timeout_secs(10), 3);
    }

    #[test]
    fn test_unsupported_in_fallback() {
        let q = QueryBuilder::new()
            .root("/a")
            .content_text("invoice")
            .aspect_ratio(Range::at_least(1.0))
            .build()
            .unwrap();
        assert_eq!(q.unsupported_in_fallback(), vec!["content text", "aspect ratio"]);
    }
}
