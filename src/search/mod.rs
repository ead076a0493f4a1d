//! The unified search engine
//!
//! ## Architecture
//!
//! ```text
//!  SearchQuery ──► Searcher::search ──► SearchStream (lazy)
//!                                         │
//!        ┌────────────────────────────────┼──────────────────────────┐
//!        ▼                                ▼                          ▼
//!   IndexedSearch                  CoverageProber             FallbackScanner
//!   one query, all roots     roots the index said nothing   worker pool per
//!   rows ──► entries         about: covered or not?          uncovered root
//! ```
//!
//! - [`indexed`] - runs the combined index query and applies the timeout policy
//! - [`coverage`] - per-root coverage tracking and probing
//! - [`scanner`] - bounded, cancellable concurrent directory walker
//! - [`orchestrator`] - sequences the phases into one stream
//! - [`report`] - injected diagnostics
//! - [`clock`] - time source for the timeout heuristic

pub mod clock;
pub mod coverage;
pub mod indexed;
pub mod orchestrator;
pub mod report;
pub mod scanner;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coverage::{CoverageProber, CoverageTracker, RootCoverage};
pub use indexed::{IndexedOutcome, IndexedSearch};
pub use orchestrator::{SearchStream, Searcher};
pub use report::{LogReporter, MemoryReporter, Reporter, SearchEvent};
pub use scanner::{DirLister, FallbackScanner, FsLister, Listed, ScanStream};

use crate::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One item of a search stream
#[derive(Debug)]
pub enum SearchItem {
    Entry(Entry),
    /// The index timed out; results for the affected roots are incomplete
    Timeout,
}

impl SearchItem {
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            SearchItem::Entry(entry) => Some(entry),
            SearchItem::Timeout => None,
        }
    }

    pub fn into_entry(self) -> Option<Entry> {
        match self {
            SearchItem::Entry(entry) => Some(entry),
            SearchItem::Timeout => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SearchItem::Timeout)
    }
}

/// Cancellation flag shared by everything working on one search call.
///
/// Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
