//! Per-root index coverage
//!
//! A root the index returned results for is covered. A root it said nothing
//! about is ambiguous: either nothing matched, or the index doesn't cover it.
//! The prober settles that with a one-row query scoped to the root.
//!
//! A root that is indexed but empty looks exactly like an unindexed one and
//! gets scanned. Scanning an empty directory is cheap.

use crate::backend::{BackendSession, IndexQuery, QueryScope, RowEvent};
use crate::query::render_probe;
use crate::search::report::{Reporter, SearchEvent};
use crate::utils::containing_root;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What is known about one root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootCoverage {
    /// Nothing yet
    Unknown,
    /// The search returned at least one result under the root
    Covered,
    /// No results, but a probe found the root in the index
    ProbedCovered,
    /// Needs a fallback scan
    ProbedUncovered,
}

impl RootCoverage {
    pub fn needs_scan(&self) -> bool {
        *self == RootCoverage::ProbedUncovered
    }
}

/// Coverage state for every root of one search call
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    roots: Vec<PathBuf>,
    states: Vec<RootCoverage>,
}

impl CoverageTracker {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let states = vec![RootCoverage::Unknown; roots.len()];
        Self { roots, states }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Record a result. Returns the root it belongs to, or `None` if it lies
    /// outside every root.
    pub fn mark_path(&mut self, path: &Path) -> Option<usize> {
        let index = containing_root(path, &self.roots)?;
        if self.states[index] == RootCoverage::Unknown {
            self.states[index] = RootCoverage::Covered;
        }
        Some(index)
    }

    pub fn state(&self, index: usize) -> RootCoverage {
        self.states[index]
    }

    pub fn set(&mut self, index: usize, state: RootCoverage) {
        self.states[index] = state;
    }

    /// Roots no result has been recorded for, in request order
    pub fn unknown_roots(&self) -> Vec<usize> {
        self.indices_in(RootCoverage::Unknown)
    }

    /// Every root goes to the fallback scanner
    pub fn mark_all_uncovered(&mut self) {
        self.states.fill(RootCoverage::ProbedUncovered);
    }

    /// Roots to scan, in request order
    pub fn uncovered_roots(&self) -> Vec<PathBuf> {
        self.indices_in(RootCoverage::ProbedUncovered)
            .into_iter()
            .map(|i| self.roots[i].clone())
            .collect()
    }

    fn indices_in(&self, state: RootCoverage) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == state)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Asks the index whether it knows anything under a root
pub struct CoverageProber {
    reporter: Arc<dyn Reporter>,
    timeout_secs: u64,
}

impl CoverageProber {
    pub fn new(reporter: Arc<dyn Reporter>, timeout_secs: u64) -> Self {
        Self {
            reporter,
            timeout_secs,
        }
    }

    /// True if the index holds at least one entry under `root`.
    ///
    /// Filters don't apply. Any failure counts as not covered.
    pub fn probe(&self, session: &mut dyn BackendSession, root: &Path) -> bool {
        let query = IndexQuery {
            text: render_probe(root),
            timeout_secs: self.timeout_secs,
            limit: Some(1),
            scope: QueryScope::Probe(root),
        };

        let mut rows = match session.execute(&query) {
            Ok(rows) => rows,
            Err(e) => {
                self.failed(root, e.to_string());
                return false;
            }
        };

        match rows.next() {
            Some(RowEvent::Row(_)) => true,
            Some(RowEvent::TimedOut) => {
                self.failed(root, "probe timed out".to_string());
                false
            }
            Some(RowEvent::Failed(error)) => {
                self.failed(root, error);
                false
            }
            None => false,
        }
    }

    fn failed(&self, root: &Path, error: String) {
        self.reporter.report(SearchEvent::ProbeFailed {
            root: root.to_path_buf(),
            error,
        });
    }
}
