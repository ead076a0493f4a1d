//! Diagnostics reporting
//!
//! Search components never log through a global. They are handed a
//! [`Reporter`] and describe what happened with a [`SearchEvent`]; the
//! reporter decides where it goes. [`LogReporter`] forwards to the `log`
//! facade, [`MemoryReporter`] keeps events for inspection.

use crate::error::ScanError;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Something worth telling the operator about
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// The index service couldn't be reached; everything falls back to scanning
    BackendUnreachable { reason: String },
    /// The index query failed mid-way
    QueryFailed { error: String },
    /// The index query ran out of time
    QueryTimedOut { timeout_secs: u64, elapsed: Duration },
    /// A root got no results from the index and will be probed
    RootWithoutResults { root: PathBuf },
    /// The coverage probe itself failed
    ProbeFailed { root: PathBuf, error: String },
    /// A root is being scanned directly
    FallbackScan { root: PathBuf },
    /// A filter the scanner ignores
    UnsupportedFilter { filter: &'static str },
    /// A directory the scanner couldn't list
    ScanFailed { path: PathBuf, error: String },
    /// A scan worker died; results under this root may be incomplete
    WorkerPanicked { root: PathBuf },
}

impl SearchEvent {
    pub fn scan_failed(error: &ScanError) -> Self {
        SearchEvent::ScanFailed {
            path: error.path.clone(),
            error: error.source.to_string(),
        }
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: SearchEvent);
}

/// Reporter backed by the `log` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: SearchEvent) {
        match event {
            SearchEvent::BackendUnreachable { reason } => {
                log::warn!("index unavailable, scanning directly: {}", reason);
            }
            SearchEvent::QueryFailed { error } => {
                log::error!("index search error: {}", error);
            }
            SearchEvent::QueryTimedOut { timeout_secs, elapsed } => {
                log::warn!(
                    "index search timed out (timeout {}s, elapsed {:.1}s)",
                    timeout_secs,
                    elapsed.as_secs_f64()
                );
            }
            SearchEvent::RootWithoutResults { root } => {
                log::warn!("no results for {}", root.display());
            }
            SearchEvent::ProbeFailed { root, error } => {
                log::warn!("coverage probe failed for {}: {}", root.display(), error);
            }
            SearchEvent::FallbackScan { root } => {
                log::info!("scanning {} directly", root.display());
            }
            SearchEvent::UnsupportedFilter { filter } => {
                log::warn!("{} search not supported in fallback search", filter);
            }
            SearchEvent::ScanFailed { path, error } => {
                log::debug!("skipping {}: {}", path.display(), error);
            }
            SearchEvent::WorkerPanicked { root } => {
                log::error!("scan worker panicked while scanning {}", root.display());
            }
        }
    }
}

/// Reporter that records events in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<SearchEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of recorded events matching `pred`
    pub fn count(&self, pred: impl Fn(&SearchEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| pred(ev)).count())
            .unwrap_or(0)
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: SearchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
