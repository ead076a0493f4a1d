//! Result filters
//!
//! Two groups of predicates live here:
//!
//! - [`ListingFilter`] works from nothing but a name and an entry kind, so the
//!   fallback scanner can apply it to a raw directory listing without a `stat`.
//! - [`DimensionFilter`] needs image dimensions, which only index rows carry.
//!   It is applied to rows after the backend returns them.

use crate::entry::EntryKind;
use crate::error::{Result, SearchError};
use crate::query::SearchQuery;
use crate::utils::{app_data::SearchConfig, contains_all_lowercase, lowercase_tokens};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Media type filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Images,
    Videos,
}

impl MediaType {
    /// Extensions the fallback scanner accepts for this media type
    pub fn extensions<'a>(&self, config: &'a SearchConfig) -> &'a [String] {
        match self {
            MediaType::Images => &config.image_extensions,
            MediaType::Videos => &config.video_extensions,
        }
    }

    /// Compile the extension allowlist into a case-insensitive glob set
    pub fn glob_set(&self, config: &SearchConfig) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for ext in self.extensions(config) {
            let ext = ext.trim_start_matches('.');
            let glob = GlobBuilder::new(&format!("*.{}", ext))
                .case_insensitive(true)
                .build()
                .map_err(|e| SearchError::InvalidQuery(format!("bad extension {:?}: {}", ext, e)))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| SearchError::InvalidQuery(e.to_string()))
    }
}

impl FromStr for MediaType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "images" | "image" => Ok(MediaType::Images),
            "videos" | "video" => Ok(MediaType::Videos),
            other => Err(SearchError::InvalidQuery(format!("unknown media type: {}", other))),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Images => write!(f, "images"),
            MediaType::Videos => write!(f, "videos"),
        }
    }
}

/// Inclusive range where either bound may be missing
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Range<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    pub fn at_least(min: T) -> Self {
        Self { min: Some(min), max: None }
    }

    pub fn at_most(max: T) -> Self {
        Self { min: None, max: Some(max) }
    }

    /// `min <= value <= max`, ignoring missing bounds
    pub fn contains(&self, value: T) -> bool {
        if let Some(min) = self.min {
            if min > value {
                return false;
            }
        }
        if let Some(max) = self.max {
            if max < value {
                return false;
            }
        }
        true
    }

    /// True if the bounds are ordered (or one is missing)
    pub fn is_ordered(&self) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }
}

impl Range<f64> {
    /// Reject NaN, infinite, or negative bounds and inverted ranges
    pub fn validate(&self, what: &str) -> Result<()> {
        for bound in [self.min, self.max].into_iter().flatten() {
            if !bound.is_finite() || bound < 0.0 {
                return Err(SearchError::InvalidQuery(format!(
                    "{} bound must be a non-negative number, got {}",
                    what, bound
                )));
            }
        }
        if !self.is_ordered() {
            return Err(SearchError::InvalidQuery(format!("{} range is inverted", what)));
        }
        Ok(())
    }
}

impl Range<u64> {
    pub fn validate(&self, what: &str) -> Result<()> {
        if !self.is_ordered() {
            return Err(SearchError::InvalidQuery(format!("{} range is inverted", what)));
        }
        Ok(())
    }
}

/// Parses `MIN:MAX`, `MIN:` or `:MAX`
impl<T> FromStr for Range<T>
where
    T: FromStr + PartialOrd + Copy,
{
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        let (min, max) = s
            .split_once(':')
            .ok_or_else(|| SearchError::InvalidQuery(format!("expected MIN:MAX, got {:?}", s)))?;

        let parse = |part: &str| -> Result<Option<T>> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse::<T>()
                .map(Some)
                .map_err(|_| SearchError::InvalidQuery(format!("invalid range bound {:?}", part)))
        };

        Ok(Self::new(parse(min)?, parse(max)?))
    }
}

/// Filters that can be decided from a directory listing alone
#[derive(Debug, Clone)]
pub struct ListingFilter {
    filename: Option<String>,
    tokens: Vec<String>,
    media: Option<GlobSet>,
    include_files: bool,
    include_dirs: bool,
}

impl ListingFilter {
    pub fn from_query(query: &SearchQuery, config: &SearchConfig) -> Result<Self> {
        let media = query
            .media_type()
            .map(|media| media.glob_set(config))
            .transpose()?;

        Ok(Self {
            filename: query.filename().map(str::to_string),
            tokens: lowercase_tokens(query.substring_tokens()),
            media,
            include_files: query.include_files(),
            include_dirs: query.include_dirs(),
        })
    }

    /// A filter that accepts everything
    pub fn accept_all() -> Self {
        Self {
            filename: None,
            tokens: Vec::new(),
            media: None,
            include_files: true,
            include_dirs: true,
        }
    }

    pub fn matches(&self, name: &str, kind: EntryKind) -> bool {
        match kind {
            EntryKind::File if !self.include_files => return false,
            EntryKind::Directory if !self.include_dirs => return false,
            _ => {}
        }

        if let Some(filename) = &self.filename {
            if name != filename {
                return false;
            }
        }

        if !contains_all_lowercase(name, &self.tokens) {
            return false;
        }

        match &self.media {
            Some(globs) => globs.is_match(name),
            None => true,
        }
    }
}

/// Filters on image dimensions, applied to index rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DimensionFilter {
    pub total_pixels: Option<Range<u64>>,
    pub aspect_ratio: Option<Range<f64>>,
}

impl DimensionFilter {
    pub fn from_query(query: &SearchQuery) -> Self {
        Self {
            total_pixels: query.total_pixels(),
            aspect_ratio: query.aspect_ratio(),
        }
    }

    /// Decide on a row. Without both dimensions the filter doesn't apply.
    pub fn accepts(&self, width: Option<u32>, height: Option<u32>) -> bool {
        let (Some(width), Some(height)) = (width, height) else {
            return true;
        };

        if let Some(ratio_range) = &self.aspect_ratio {
            // A zero height has no ratio; leave it to the pixel check
            if height != 0 && !ratio_range.contains(width as f64 / height as f64) {
                return false;
            }
        }

        if let Some(pixel_range) = &self.total_pixels {
            if !pixel_range.contains(width as u64 * height as u64) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;

    fn filter_for(builder: QueryBuilder) -> ListingFilter {
        let query = builder.build().unwrap();
        ListingFilter::from_query(&query, &SearchConfig::default()).unwrap()
    }

    #[test]
    fn test_range_contains() {
        let r = Range::new(Some(1.0), Some(2.0));
        assert!(r.contains(1.0));
        assert!(r.contains(2.0));
        assert!(!r.contains(2.5));
        assert!(Range::<u64>::default().contains(123));
        assert!(Range::at_least(10u64).contains(10));
        assert!(!Range::at_most(10u64).contains(11));
    }

    #[test]
    fn test_range_parse() {
        let r: Range<f64> = "1.5:".parse().unwrap();
        assert_eq!(r, Range::at_least(1.5));
        let r: Range<u64> = ":2000000".parse().unwrap();
        assert_eq!(r, Range::at_most(2_000_000));
        assert!("12".parse::<Range<u64>>().is_err());
        assert!("a:b".parse::<Range<u64>>().is_err());
    }

    #[test]
    fn test_range_validate() {
        assert!(Range::new(Some(2.0), Some(1.0)).validate("aspect ratio").is_err());
        assert!(Range::new(Some(f64::NAN), None).validate("aspect ratio").is_err());
        assert!(Range::new(Some(-1.0), None).validate("aspect ratio").is_err());
        assert!(Range::new(Some(5u64), Some(1)).validate("pixels").is_err());
        assert!(Range::new(Some(0.5), Some(0.5)).validate("aspect ratio").is_ok());
    }

    #[test]
    fn test_aspect_ratio_filter() {
        let filter = DimensionFilter {
            total_pixels: None,
            aspect_ratio: Some(Range::at_least(1.0)),
        };
        // 100x200 has ratio 0.5
        assert!(!filter.accepts(Some(100), Some(200)));
        // 200x100 has ratio 2.0
        assert!(filter.accepts(Some(200), Some(100)));
    }

    #[test]
    fn test_dimension_filter_needs_both_sides() {
        let filter = DimensionFilter {
            total_pixels: Some(Range::at_least(1_000_000)),
            aspect_ratio: None,
        };
        assert!(filter.accepts(None, None));
        assert!(filter.accepts(Some(10), None));
        assert!(!filter.accepts(Some(10), Some(10)));
        assert!(filter.accepts(Some(1000), Some(1000)));
    }

    #[test]
    fn test_listing_filter_substring_and_media() {
        let filter = filter_for(
            QueryBuilder::new()
                .root("/r")
                .substring("y")
                .media_type(MediaType::Images),
        );
        assert!(filter.matches("y.png", EntryKind::File));
        assert!(filter.matches("Y.PNG", EntryKind::File));
        assert!(!filter.matches("x.jpg", EntryKind::File));
        assert!(!filter.matches("y.txt", EntryKind::File));
        assert!(!filter.matches("sub", EntryKind::Directory));
    }

    #[test]
    fn test_listing_filter_videos_include_gif() {
        let filter = filter_for(QueryBuilder::new().root("/r").media_type(MediaType::Videos));
        assert!(filter.matches("loop.gif", EntryKind::File));
        assert!(filter.matches("movie.MKV", EntryKind::File));
        assert!(!filter.matches("photo.jpg", EntryKind::File));
    }

    #[test]
    fn test_listing_filter_exact_name_and_kinds() {
        let filter = filter_for(QueryBuilder::new().root("/r").filename("cover.jpg").include_dirs(false));
        assert!(filter.matches("cover.jpg", EntryKind::File));
        assert!(!filter.matches("Cover.jpg", EntryKind::File));
        assert!(!filter.matches("cover.jpg", EntryKind::Directory));

        let dirs_only = filter_for(QueryBuilder::new().root("/r").include_files(false));
        assert!(dirs_only.matches("albums", EntryKind::Directory));
        assert!(!dirs_only.matches("a.jpg", EntryKind::File));
    }

    #[test]
    fn test_accept_all() {
        let filter = ListingFilter::accept_all();
        assert!(filter.matches("anything", EntryKind::File));
        assert!(filter.matches("anything", EntryKind::Directory));
    }
}
