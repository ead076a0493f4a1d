//! In-process index backend
//!
//! Answers queries from a fixed set of rows by evaluating the structured
//! query rather than the query text. Failure, hang and timeout behavior can
//! be switched on to exercise the engine's recovery paths.

use crate::backend::{BackendSession, IndexQuery, IndexedBackend, QueryScope, Row, RowEvent, RowStream};
use crate::entry::{Entry, EntryKind};
use crate::error::{Result, SearchError};
use crate::query::{MediaType, SearchQuery};
use crate::utils::app_data::SearchConfig;
use crate::utils::contains_all_tokens;
use ahash::AHashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Behavior {
    reachable: bool,
    /// Search queries fail with this message...
    failure: Option<String>,
    /// ...after this many rows
    fail_after: usize,
    probes_fail: bool,
    /// Search queries stall this long before producing anything
    hang: Option<Duration>,
    signals_timeouts: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            reachable: true,
            failure: None,
            fail_after: 0,
            probes_fail: false,
            hang: None,
            signals_timeouts: true,
        }
    }
}

/// Index backend over rows held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    rows: Arc<Vec<Row>>,
    contents: Arc<AHashMap<String, String>>,
    behavior: Behavior,
    connections: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, row: Row) -> Self {
        Arc::make_mut(&mut self.rows).push(row);
        self
    }

    pub fn with_rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        Arc::make_mut(&mut self.rows).extend(rows);
        self
    }

    /// Attach document text for content searches
    pub fn with_contents(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.contents).insert(path.into(), text.into());
        self
    }

    /// Refuse every connection
    pub fn unreachable(mut self) -> Self {
        self.behavior.reachable = false;
        self
    }

    /// Fail search queries after `after_rows` rows
    pub fn failing(mut self, message: impl Into<String>, after_rows: usize) -> Self {
        self.behavior.failure = Some(message.into());
        self.behavior.fail_after = after_rows;
        self
    }

    /// Make coverage probes fail
    pub fn probes_fail(mut self) -> Self {
        self.behavior.probes_fail = true;
        self
    }

    /// Stall search queries. A stall longer than the query timeout ends in a timeout.
    pub fn hanging(mut self, stall: Duration) -> Self {
        self.behavior.hang = Some(stall);
        self
    }

    /// Report timeouts as generic failures, like backends without a timeout signal
    pub fn without_timeout_signal(mut self) -> Self {
        self.behavior.signals_timeouts = false;
        self
    }

    /// Number of sessions opened so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Text of every query executed so far
    pub fn executed_queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl IndexedBackend for MemoryBackend {
    fn connect(&self) -> Result<Box<dyn BackendSession>> {
        if !self.behavior.reachable {
            return Err(SearchError::BackendUnreachable(
                "memory backend is offline".to_string(),
            ));
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            backend: self.clone(),
            media: SearchConfig::default(),
        }))
    }
}

struct MemorySession {
    backend: MemoryBackend,
    /// Extension lists used when a row has no MIME type
    media: SearchConfig,
}

impl MemorySession {
    fn matches_search(&self, query: &SearchQuery, row: &Row) -> bool {
        let path = Path::new(&row.path);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        let in_scope = match query.exact_path() {
            Some(exact) => path == exact,
            None => query.roots().iter().any(|root| {
                if query.recurse() {
                    path.starts_with(root) && path != root
                } else {
                    path.parent() == Some(root.as_path())
                }
            }),
        };
        if !in_scope {
            return false;
        }

        match row.kind() {
            EntryKind::File if !query.include_files() => return false,
            EntryKind::Directory if !query.include_dirs() => return false,
            _ => {}
        }

        if let Some(filename) = query.filename() {
            if !name.eq_ignore_ascii_case(filename) {
                return false;
            }
        }

        if !contains_all_tokens(name, query.substring_tokens()) {
            return false;
        }

        if let Some(text) = query.content_text() {
            let found = self
                .backend
                .contents
                .get(&row.path)
                .is_some_and(|body| body.to_lowercase().contains(&text.to_lowercase()));
            if !found {
                return false;
            }
        }

        match query.media_type() {
            Some(media) => self.is_media(row, name, media),
            None => true,
        }
    }

    fn is_media(&self, row: &Row, name: &str, media: MediaType) -> bool {
        let lower = name.to_lowercase();
        if media == MediaType::Videos && lower.ends_with(".gif") {
            return true;
        }
        match (&row.mime_type, media) {
            (Some(mime), MediaType::Images) => mime.starts_with("image/"),
            (Some(mime), MediaType::Videos) => mime.starts_with("video/"),
            (None, _) => media
                .extensions(&self.media)
                .iter()
                .any(|ext| lower.ends_with(&format!(".{}", ext))),
        }
    }

    fn search_events(&self, query: &SearchQuery, timeout_secs: u64) -> (Option<Duration>, VecDeque<RowEvent>) {
        let behavior = &self.backend.behavior;

        if let Some(stall) = behavior.hang {
            let limit = Duration::from_secs(timeout_secs);
            if timeout_secs > 0 && stall > limit {
                let event = if behavior.signals_timeouts {
                    RowEvent::TimedOut
                } else {
                    RowEvent::Failed("Exception occurred".to_string())
                };
                return (Some(limit), VecDeque::from([event]));
            }
        }

        let mut rows: Vec<Row> = self
            .backend
            .rows
            .iter()
            .filter(|row| self.matches_search(query, row))
            .cloned()
            .collect();

        if let Some(order) = query.order() {
            rows.sort_by(|a, b| order.compare(&Entry::from_row(a.clone()), &Entry::from_row(b.clone())));
        }

        let mut events: VecDeque<RowEvent> = rows.into_iter().map(RowEvent::Row).collect();
        if let Some(message) = &behavior.failure {
            events.truncate(behavior.fail_after);
            events.push_back(RowEvent::Failed(message.clone()));
        }

        (behavior.hang, events)
    }

    fn probe_events(&self, root: &Path, limit: Option<usize>) -> VecDeque<RowEvent> {
        self.backend
            .rows
            .iter()
            .filter(|row| Path::new(&row.path).starts_with(root))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .map(RowEvent::Row)
            .collect()
    }
}

impl BackendSession for MemorySession {
    fn execute(&mut self, query: &IndexQuery<'_>) -> Result<RowStream> {
        if let Ok(mut executed) = self.backend.queries.lock() {
            executed.push(query.text.clone());
        }

        let (delay, mut events) = match query.scope {
            QueryScope::Search(search) => self.search_events(search, query.timeout_secs),
            QueryScope::Probe(root) => {
                if self.backend.behavior.probes_fail {
                    return Err(SearchError::Query("probe rejected".to_string()));
                }
                (None, self.probe_events(root, query.limit))
            }
        };

        if let Some(limit) = query.limit {
            events.truncate(limit);
        }

        Ok(Box::new(MemoryRowStream { delay, events }))
    }

    fn signals_timeouts(&self) -> bool {
        self.backend.behavior.signals_timeouts
    }
}

struct MemoryRowStream {
    delay: Option<Duration>,
    events: VecDeque<RowEvent>,
}

impl Iterator for MemoryRowStream {
    type Item = RowEvent;

    fn next(&mut self) -> Option<RowEvent> {
        if let Some(delay) = self.delay.take() {
            thread::sleep(delay);
        }
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{render_probe, render_query, QueryBuilder};

    fn file(path: &str, mime: &str) -> Row {
        Row {
            path: path.to_string(),
            item_type: "File".to_string(),
            mime_type: Some(mime.to_string()),
            ..Row::default()
        }
    }

    fn run(backend: &MemoryBackend, query: &SearchQuery) -> Vec<RowEvent> {
        let mut session = backend.connect().unwrap();
        let index_query = IndexQuery {
            text: render_query(query),
            timeout_secs: query.effective_timeout_secs(10),
            limit: None,
            scope: QueryScope::Search(query),
        };
        session.execute(&index_query).unwrap().collect()
    }

    #[test]
    fn test_search_scope_and_filters() {
        let backend = MemoryBackend::new().with_rows([
            file("/a/cat.jpg", "image/jpeg"),
            file("/a/sub/cat.mp4", "video/mp4"),
            file("/b/cat.jpg", "image/jpeg"),
        ]);

        let q = QueryBuilder::new()
            .root("/a")
            .substring("CAT")
            .media_type(MediaType::Images)
            .build()
            .unwrap();
        let events = run(&backend, &q);
        assert_eq!(events, vec![RowEvent::Row(file("/a/cat.jpg", "image/jpeg"))]);

        let flat = QueryBuilder::new().root("/a").recurse(false).build().unwrap();
        assert_eq!(run(&backend, &flat).len(), 1);
        assert_eq!(backend.executed_queries().len(), 2);
    }

    #[test]
    fn test_probe_respects_limit() {
        let backend = MemoryBackend::new().with_rows([
            file("/a/1.jpg", "image/jpeg"),
            file("/a/2.jpg", "image/jpeg"),
        ]);
        let mut session = backend.connect().unwrap();
        let root = Path::new("/a");
        let probe = IndexQuery {
            text: render_probe(root),
            timeout_secs: 1,
            limit: Some(1),
            scope: QueryScope::Probe(root),
        };
        assert_eq!(session.execute(&probe).unwrap().count(), 1);
    }

    #[test]
    fn test_failure_after_rows() {
        let backend = MemoryBackend::new()
            .with_rows([file("/a/1.jpg", "image/jpeg"), file("/a/2.jpg", "image/jpeg")])
            .failing("boom", 1);
        let q = QueryBuilder::new().root("/a").build().unwrap();
        let events = run(&backend, &q);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], RowEvent::Failed("boom".to_string()));
    }

    #[test]
    fn test_unreachable() {
        let backend = MemoryBackend::new().unreachable();
        assert!(matches!(backend.connect(), Err(SearchError::BackendUnreachable(_))));
        assert_eq!(backend.connections(), 0);
    }

    #[test]
    fn test_content_search() {
        let backend = MemoryBackend::new()
            .with_rows([file("/a/notes.txt", "text/plain"), file("/a/other.txt", "text/plain")])
            .with_contents("/a/notes.txt", "Quarterly Invoice");
        let q = QueryBuilder::new().root("/a").content_text("invoice").build().unwrap();
        assert_eq!(run(&backend, &q).len(), 1);
    }
}
