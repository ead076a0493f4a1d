//! Search orchestration
//!
//! Per root, a search call moves through:
//!
//! ```text
//! Unknown ──(index result)──► Covered
//!    │
//!    └─(index silent)──► probe ──► ProbedCovered
//!                              └─► ProbedUncovered ──► fallback scan
//! ```
//!
//! The combined index query streams first. Roots it said nothing about are
//! probed once the index is done (also after a timeout or a failure). Roots
//! the probe can't confirm are scanned one after another, in request order.
//! When the index service is unreachable every root goes straight to the
//! scanner.

use crate::backend::{BackendSession, IndexedBackend};
use crate::error::{Result, SearchError};
use crate::query::{ListingFilter, SearchQuery};
use crate::search::clock::{Clock, SystemClock};
use crate::search::coverage::{CoverageProber, CoverageTracker, RootCoverage};
use crate::search::indexed::IndexedSearch;
use crate::search::report::{LogReporter, Reporter, SearchEvent};
use crate::search::scanner::{DirLister, FallbackScanner, FsLister, ScanStream};
use crate::search::{CancelFlag, SearchItem};
use crate::utils::app_data::SearchConfig;
use ahash::AHashSet;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entry point for searches. Cheap to share; holds no per-search state.
pub struct Searcher {
    backend: Option<Arc<dyn IndexedBackend>>,
    config: SearchConfig,
    reporter: Arc<dyn Reporter>,
    lister: Arc<dyn DirLister>,
    clock: Arc<dyn Clock>,
}

impl Searcher {
    pub fn new(backend: Arc<dyn IndexedBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::without_index()
        }
    }

    /// A searcher that always scans
    pub fn without_index() -> Self {
        Self {
            backend: None,
            config: SearchConfig::default(),
            reporter: Arc::new(LogReporter),
            lister: Arc::new(FsLister),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_lister(mut self, lister: Arc<dyn DirLister>) -> Self {
        self.lister = lister;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Start a search. Nothing is read until the stream is iterated, except
    /// for the connection and the index query being sent.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchStream> {
        let filter = Arc::new(ListingFilter::from_query(query, &self.config)?);
        let scanner = FallbackScanner::new(
            Arc::clone(&self.lister),
            Arc::clone(&self.reporter),
            self.config.effective_scan_workers(),
        );
        let prober = CoverageProber::new(Arc::clone(&self.reporter), self.config.probe_timeout_secs);

        let mut stream = SearchStream {
            query: query.clone(),
            tracker: CoverageTracker::new(query.search_roots()),
            session: None,
            phase: Phase::Done,
            pending: VecDeque::new(),
            seen: AHashSet::new(),
            filter,
            scanner,
            prober,
            reporter: Arc::clone(&self.reporter),
            cancel: CancelFlag::new(),
            warned_unsupported: false,
        };

        let session = match &self.backend {
            Some(backend) => match backend.connect() {
                Ok(session) => Some(session),
                Err(e) => {
                    let reason = match e {
                        SearchError::BackendUnreachable(reason) => reason,
                        other => other.to_string(),
                    };
                    self.reporter.report(SearchEvent::BackendUnreachable { reason });
                    None
                }
            },
            None => None,
        };

        match session {
            Some(mut session) => {
                let indexed = IndexedSearch::start(
                    session.as_mut(),
                    query,
                    self.config.default_timeout_secs,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.reporter),
                );
                stream.session = Some(session);
                stream.phase = Phase::Indexed(indexed);
            }
            None => {
                stream.tracker.mark_all_uncovered();
                stream.enter_fallback();
            }
        }

        Ok(stream)
    }

    /// Ask the index whether it covers `root`, without searching
    pub fn probe(&self, root: &Path) -> Result<bool> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            SearchError::BackendUnreachable("no index backend configured".to_string())
        })?;
        let mut session = backend.connect()?;
        let prober = CoverageProber::new(Arc::clone(&self.reporter), self.config.probe_timeout_secs);
        Ok(prober.probe(session.as_mut(), root))
    }
}

enum Phase {
    Indexed(IndexedSearch),
    Probing,
    Fallback,
    Scanning(ScanStream),
    Done,
}

/// Lazy stream of results for one search call.
///
/// Yields `Ok(SearchItem::Entry)` for results, at most one
/// `Ok(SearchItem::Timeout)`, and ends after an `Err`. Dropping the stream
/// cancels any scan still running.
pub struct SearchStream {
    query: SearchQuery,
    tracker: CoverageTracker,
    /// One connection for the whole call; released once probing is done
    session: Option<Box<dyn BackendSession>>,
    phase: Phase,
    /// Roots left to scan
    pending: VecDeque<PathBuf>,
    /// Paths yielded from the index
    seen: AHashSet<PathBuf>,
    filter: Arc<ListingFilter>,
    scanner: FallbackScanner,
    prober: CoverageProber,
    reporter: Arc<dyn Reporter>,
    cancel: CancelFlag,
    warned_unsupported: bool,
}

impl SearchStream {
    /// Coverage decided so far, one state per root
    pub fn coverage(&self) -> &CoverageTracker {
        &self.tracker
    }

    /// Flag that stops this search when set, from any thread
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn probe_unknown_roots(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        for index in self.tracker.unknown_roots() {
            if self.cancel.is_cancelled() {
                return;
            }
            let root = self.tracker.roots()[index].clone();
            self.reporter.report(SearchEvent::RootWithoutResults { root: root.clone() });

            let state = if self.prober.probe(session.as_mut(), &root) {
                RootCoverage::ProbedCovered
            } else {
                RootCoverage::ProbedUncovered
            };
            self.tracker.set(index, state);
        }
    }

    fn enter_fallback(&mut self) {
        self.session = None;
        self.pending = self.tracker.uncovered_roots().into();
        self.phase = Phase::Fallback;

        if !self.pending.is_empty() && !self.warned_unsupported {
            self.warned_unsupported = true;
            for filter in self.query.unsupported_in_fallback() {
                self.reporter.report(SearchEvent::UnsupportedFilter { filter });
            }
        }
    }

    /// Start the next root. Returns an entry right away for exact-path lookups.
    fn next_root(&mut self) -> Option<Result<SearchItem>> {
        let Some(root) = self.pending.pop_front() else {
            self.phase = Phase::Done;
            return None;
        };
        self.reporter.report(SearchEvent::FallbackScan { root: root.clone() });

        if self.query.exact_path().is_some() {
            return self
                .scanner
                .lookup(&root, &self.filter)
                .map(|entry| Ok(SearchItem::Entry(entry)));
        }

        match self.scanner.scan(
            &root,
            Arc::clone(&self.filter),
            self.query.recurse(),
            self.query.order(),
            self.cancel.clone(),
        ) {
            Ok(stream) => {
                self.phase = Phase::Scanning(stream);
                None
            }
            Err(e) => {
                self.phase = Phase::Done;
                Some(Err(e))
            }
        }
    }
}

impl Iterator for SearchStream {
    type Item = Result<SearchItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancel.is_cancelled() {
                self.phase = Phase::Done;
                self.session = None;
                return None;
            }

            match &mut self.phase {
                Phase::Indexed(indexed) => match indexed.next() {
                    Some(Ok(SearchItem::Entry(entry))) => {
                        // Results outside every root belong to nobody
                        if self.tracker.mark_path(entry.path()).is_none() {
                            continue;
                        }
                        if !self.seen.insert(entry.path().to_path_buf()) {
                            continue;
                        }
                        return Some(Ok(SearchItem::Entry(entry)));
                    }
                    Some(Ok(SearchItem::Timeout)) => {
                        self.phase = Phase::Probing;
                        return Some(Ok(SearchItem::Timeout));
                    }
                    Some(Err(e)) => {
                        self.phase = Phase::Done;
                        self.session = None;
                        return Some(Err(e));
                    }
                    None => self.phase = Phase::Probing,
                },
                Phase::Probing => {
                    self.probe_unknown_roots();
                    self.enter_fallback();
                }
                Phase::Fallback => {
                    if let Some(item) = self.next_root() {
                        return Some(item);
                    }
                }
                Phase::Scanning(scan) => match scan.next() {
                    Some(entry) => return Some(Ok(SearchItem::Entry(entry))),
                    None => self.phase = Phase::Fallback,
                },
                Phase::Done => return None,
            }
        }
    }
}

impl Drop for SearchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
