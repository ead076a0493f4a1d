//! Indexed search phase
//!
//! Sends one query covering every root and turns the row stream into
//! entries. Dimension filters are applied here, because the index can't.
//!
//! Timeout policy:
//! - the caller chose a timeout: a timeout yields one [`SearchItem::Timeout`]
//!   and the stream ends normally
//! - the caller didn't: a timeout is a terminal [`SearchError::Timeout`], so
//!   partial results are never mistaken for complete ones
//!
//! Backends that can't signal a timeout only report a generic failure. For
//! those, a failure that arrives within half a second of the timeout is
//! counted as a timeout.

use crate::backend::{BackendSession, IndexQuery, QueryScope, RowEvent, RowStream};
use crate::entry::Entry;
use crate::error::{Result, SearchError};
use crate::query::{render_query, DimensionFilter, SearchQuery};
use crate::search::clock::Clock;
use crate::search::report::{Reporter, SearchEvent};
use crate::search::SearchItem;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How close to the timeout a generic failure must be to count as one
const TIMEOUT_SLACK: Duration = Duration::from_millis(500);

/// How the indexed phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexedOutcome {
    Running,
    /// All rows were delivered
    Completed,
    /// The query failed; no coverage signal for roots without results
    Failed,
    /// The query ran out of time
    TimedOut,
}

/// Lazy stream of index results for one query
pub struct IndexedSearch {
    rows: RowStream,
    dimensions: DimensionFilter,
    timeout_secs: u64,
    reports_timeouts: bool,
    elapsed_heuristic: bool,
    started: Instant,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn Reporter>,
    outcome: IndexedOutcome,
}

impl IndexedSearch {
    /// Send the query. A query that can't even start ends immediately as failed.
    pub fn start(
        session: &mut dyn BackendSession,
        query: &SearchQuery,
        default_timeout_secs: u64,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let timeout_secs = query.effective_timeout_secs(default_timeout_secs);
        let index_query = IndexQuery {
            text: render_query(query),
            timeout_secs,
            limit: None,
            scope: QueryScope::Search(query),
        };

        let started = clock.now();
        let (rows, outcome): (RowStream, _) = match session.execute(&index_query) {
            Ok(rows) => (rows, IndexedOutcome::Running),
            Err(e) => {
                reporter.report(SearchEvent::QueryFailed {
                    error: e.to_string(),
                });
                (Box::new(std::iter::empty()), IndexedOutcome::Failed)
            }
        };

        Self {
            rows,
            dimensions: DimensionFilter::from_query(query),
            timeout_secs,
            reports_timeouts: query.reports_timeouts(),
            elapsed_heuristic: !session.signals_timeouts(),
            started,
            clock,
            reporter,
            outcome,
        }
    }

    pub fn outcome(&self) -> IndexedOutcome {
        self.outcome
    }

    fn looks_like_timeout(&self, elapsed: Duration) -> bool {
        self.elapsed_heuristic
            && self.timeout_secs != 0
            && elapsed + TIMEOUT_SLACK >= Duration::from_secs(self.timeout_secs)
    }

    fn timed_out(&mut self, elapsed: Duration) -> Result<SearchItem> {
        self.outcome = IndexedOutcome::TimedOut;
        self.reporter.report(SearchEvent::QueryTimedOut {
            timeout_secs: self.timeout_secs,
            elapsed,
        });
        if self.reports_timeouts {
            Ok(SearchItem::Timeout)
        } else {
            Err(SearchError::Timeout { elapsed })
        }
    }
}

impl Iterator for IndexedSearch {
    type Item = Result<SearchItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.outcome != IndexedOutcome::Running {
            return None;
        }

        loop {
            let event = match self.rows.next() {
                Some(event) => event,
                None => {
                    self.outcome = IndexedOutcome::Completed;
                    return None;
                }
            };

            match event {
                RowEvent::Row(row) => {
                    if !self.dimensions.accepts(row.width, row.height) {
                        continue;
                    }
                    return Some(Ok(SearchItem::Entry(Entry::from_row(row))));
                }
                RowEvent::TimedOut => {
                    let elapsed = self.clock.now() - self.started;
                    return Some(self.timed_out(elapsed));
                }
                RowEvent::Failed(error) => {
                    let elapsed = self.clock.now() - self.started;
                    if self.looks_like_timeout(elapsed) {
                        return Some(self.timed_out(elapsed));
                    }
                    self.outcome = IndexedOutcome::Failed;
                    self.reporter.report(SearchEvent::QueryFailed { error });
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IndexedBackend, MemoryBackend, Row};
    use crate::query::{QueryBuilder, Range};
    use crate::search::clock::{ManualClock, SystemClock};
    use crate::search::report::MemoryReporter;

    fn image(path: &str, width: u32, height: u32) -> Row {
        Row {
            path: path.to_string(),
            item_type: ".jpg".to_string(),
            width: Some(width),
            height: Some(height),
            ..Row::default()
        }
    }

    /// Session whose single query advances a manual clock, then fails
    struct SlowFailingSession {
        clock: Arc<ManualClock>,
        after: Duration,
    }

    impl BackendSession for SlowFailingSession {
        fn execute(&mut self, _query: &IndexQuery<'_>) -> Result<RowStream> {
            let clock = Arc::clone(&self.clock);
            let after = self.after;
            Ok(Box::new(std::iter::once_with(move || {
                clock.advance(after);
                RowEvent::Failed("Exception occurred".to_string())
            })))
        }

        fn signals_timeouts(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_aspect_ratio_applied_to_rows() {
        let backend = MemoryBackend::new().with_rows([
            image("/r/a.jpg", 100, 200),
            image("/r/b.jpg", 200, 100),
            Row {
                path: "/r/c.jpg".to_string(),
                ..Row::default()
            },
        ]);
        let query = QueryBuilder::new()
            .root("/r")
            .aspect_ratio(Range::at_least(1.0))
            .build()
            .unwrap();

        let mut session = backend.connect().unwrap();
        let search = IndexedSearch::start(
            session.as_mut(),
            &query,
            10,
            Arc::new(SystemClock),
            Arc::new(MemoryReporter::new()),
        );
        let paths: Vec<String> = search
            .map(|item| item.unwrap().into_entry().unwrap().path().display().to_string())
            .collect();

        // b passes the filter, c has no dimensions so the filter doesn't apply
        assert_eq!(paths, vec!["/r/b.jpg", "/r/c.jpg"]);
    }

    #[test]
    fn test_explicit_timeout_yields_one_signal() {
        let backend = MemoryBackend::new()
            .with_row(image("/r/a.jpg", 1, 1))
            .hanging(Duration::from_secs(5));
        let query = QueryBuilder::new().root("/r").timeout_secs(1).build().unwrap();
        let reporter = Arc::new(MemoryReporter::new());

        let mut session = backend.connect().unwrap();
        let mut search = IndexedSearch::start(
            session.as_mut(),
            &query,
            10,
            Arc::new(SystemClock),
            reporter.clone(),
        );

        let items: Vec<_> = search.by_ref().collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap().is_timeout());
        assert_eq!(search.outcome(), IndexedOutcome::TimedOut);
        assert_eq!(
            reporter.count(|e| matches!(e, SearchEvent::QueryTimedOut { .. })),
            1
        );
    }

    #[test]
    fn test_implicit_timeout_is_an_error() {
        let backend = MemoryBackend::new().hanging(Duration::from_secs(5));
        let query = QueryBuilder::new().root("/r").build().unwrap();

        let mut session = backend.connect().unwrap();
        let items: Vec<_> = IndexedSearch::start(
            session.as_mut(),
            &query,
            1,
            Arc::new(SystemClock),
            Arc::new(MemoryReporter::new()),
        )
        .collect();

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SearchError::Timeout { .. })));
    }

    #[test]
    fn test_elapsed_heuristic_detects_timeout() {
        let clock = Arc::new(ManualClock::new());
        let mut session = SlowFailingSession {
            clock: Arc::clone(&clock),
            after: Duration::from_millis(2600),
        };
        let query = QueryBuilder::new().root("/r").timeout_secs(3).build().unwrap();

        let mut search = IndexedSearch::start(
            &mut session,
            &query,
            10,
            clock.clone(),
            Arc::new(MemoryReporter::new()),
        );
        assert!(search.next().unwrap().unwrap().is_timeout());
        assert!(search.next().is_none());
        assert_eq!(search.outcome(), IndexedOutcome::TimedOut);
    }

    #[test]
    fn test_early_failure_is_not_a_timeout() {
        let clock = Arc::new(ManualClock::new());
        let mut session = SlowFailingSession {
            clock: Arc::clone(&clock),
            after: Duration::from_millis(200),
        };
        let query = QueryBuilder::new().root("/r").timeout_secs(3).build().unwrap();
        let reporter = Arc::new(MemoryReporter::new());

        let mut search =
            IndexedSearch::start(&mut session, &query, 10, clock.clone(), reporter.clone());
        assert!(search.next().is_none());
        assert_eq!(search.outcome(), IndexedOutcome::Failed);
        assert_eq!(
            reporter.count(|e| matches!(e, SearchEvent::QueryFailed { .. })),
            1
        );
    }

    #[test]
    fn test_unlimited_timeout_never_guesses() {
        let clock = Arc::new(ManualClock::new());
        let mut session = SlowFailingSession {
            clock: Arc::clone(&clock),
            after: Duration::from_secs(600),
        };
        let query = QueryBuilder::new().root("/r").timeout_secs(0).build().unwrap();

        let mut search = IndexedSearch::start(
            &mut session,
            &query,
            10,
            clock.clone(),
            Arc::new(MemoryReporter::new()),
        );
        assert!(search.next().is_none());
        assert_eq!(search.outcome(), IndexedOutcome::Failed);
    }
}
