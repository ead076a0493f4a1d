//! Concurrent fallback scanner
//!
//! Walks a root that the index doesn't cover. A fixed pool of worker threads
//! shares a FIFO queue of directories to list; each worker lists one
//! directory, filters the listing and sends matches down a channel the
//! caller reads lazily.
//!
//! Pool state (queue, visited set, active count) lives behind one mutex in a
//! [`Supervisor`]. Listing happens outside the lock.
//!
//! Cancellation is checked before every listing and before every entry is
//! sent, so after a cancel each worker finishes at most the listing it is
//! already in.

use crate::entry::{Entry, EntryKind};
use crate::error::{Result, ScanError};
use crate::query::{ListingFilter, SortOrder};
use crate::search::report::{Reporter, SearchEvent};
use crate::search::CancelFlag;
use ahash::AHashSet;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often a reader blocked on results rechecks the search flag
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// One item of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listed {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Whether a recursive scan should list this item too
    pub descend: bool,
}

/// Lists one directory. Each call is one blocking operation.
pub trait DirLister: Send + Sync {
    fn list(&self, dir: &Path) -> io::Result<Vec<Listed>>;
}

/// Lists directories on the local filesystem.
///
/// Symlinks report the kind of their target but are never descended into,
/// so link cycles can't trap a scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLister;

impl DirLister for FsLister {
    fn list(&self, dir: &Path) -> io::Result<Vec<Listed>> {
        let mut listed = Vec::new();
        for item in fs::read_dir(dir)? {
            // Entries that vanish mid-listing are skipped
            let Ok(item) = item else { continue };
            let Ok(file_type) = item.file_type() else { continue };
            let path = item.path();

            let (kind, descend) = if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_dir() => (EntryKind::Directory, false),
                    _ => (EntryKind::File, false),
                }
            } else if file_type.is_dir() {
                (EntryKind::Directory, true)
            } else {
                (EntryKind::File, false)
            };

            listed.push(Listed { path, kind, descend });
        }
        Ok(listed)
    }
}

#[derive(Debug, Default)]
struct PoolState {
    queue: VecDeque<PathBuf>,
    visited: AHashSet<PathBuf>,
    /// Workers currently listing a directory
    active: usize,
}

/// Owns the pool state. Workers only submit, take and finish tasks.
struct Supervisor {
    state: Mutex<PoolState>,
    ready: Condvar,
    /// The search call's flag
    search: CancelFlag,
    /// Set when this scan alone is abandoned
    stopped: AtomicBool,
}

impl Supervisor {
    fn new(search: CancelFlag) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            ready: Condvar::new(),
            search,
            stopped: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.search.is_cancelled()
    }

    /// Queue a directory unless it was queued before
    fn submit(&self, dir: PathBuf) -> bool {
        let mut state = self.lock();
        if !state.visited.insert(dir.clone()) {
            return false;
        }
        state.queue.push_back(dir);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Block until there is a directory to list. `None` once the scan is
    /// cancelled, or when the queue is empty and nobody can add to it.
    fn next_task(&self) -> Option<PathBuf> {
        let mut state = self.lock();
        loop {
            if self.is_cancelled() {
                // Pass the cancel on to workers still waiting
                drop(state);
                self.ready.notify_all();
                return None;
            }
            if let Some(dir) = state.queue.pop_front() {
                state.active += 1;
                return Some(dir);
            }
            if state.active == 0 {
                drop(state);
                self.ready.notify_all();
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish_task(&self) {
        let mut state = self.lock();
        state.active -= 1;
        let drained = state.active == 0 && state.queue.is_empty();
        drop(state);
        if drained {
            self.ready.notify_all();
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Take the lock so no waiter misses the wakeup
        drop(self.lock());
        self.ready.notify_all();
    }

    fn wake_all(&self) {
        drop(self.lock());
        self.ready.notify_all();
    }
}

/// Marks the task finished even if listing panics
struct TaskGuard<'a>(&'a Supervisor);

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_task();
    }
}

struct Worker {
    supervisor: Arc<Supervisor>,
    lister: Arc<dyn DirLister>,
    filter: Arc<ListingFilter>,
    reporter: Arc<dyn Reporter>,
    recurse: bool,
    results: Sender<Entry>,
}

impl Worker {
    fn run(self) {
        while let Some(dir) = self.supervisor.next_task() {
            let _guard = TaskGuard(&self.supervisor);
            if !self.list_one(dir) {
                break;
            }
        }
    }

    /// List one directory. False if the worker should stop.
    fn list_one(&self, dir: PathBuf) -> bool {
        let listing = match self.lister.list(&dir) {
            Ok(listing) => listing,
            Err(source) => {
                // The visited set guarantees one report per path
                let error = ScanError { path: dir, source };
                self.reporter.report(SearchEvent::scan_failed(&error));
                return true;
            }
        };

        for item in listing {
            if self.supervisor.is_cancelled() {
                return false;
            }
            if self.recurse && item.descend {
                self.supervisor.submit(item.path.clone());
            }

            let name = item.path.file_name().map(|n| n.to_string_lossy());
            let matched = name.is_some_and(|name| self.filter.matches(&name, item.kind));
            if matched && self.results.send(Entry::scanned(item.path, item.kind)).is_err() {
                // Nobody is reading anymore
                self.supervisor.stop();
                return false;
            }
        }
        true
    }
}

/// Entries of one root scan, produced as they are found.
///
/// Dropping the stream before it ends stops the workers and waits for them.
pub struct ScanStream {
    root: PathBuf,
    results: Receiver<Entry>,
    supervisor: Arc<Supervisor>,
    reporter: Arc<dyn Reporter>,
    workers: Vec<JoinHandle<()>>,
    order: Option<SortOrder>,
    sorted: Option<std::vec::IntoIter<Entry>>,
    finished: bool,
}

impl ScanStream {
    /// Whether the walk ran to completion
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                self.reporter.report(SearchEvent::WorkerPanicked {
                    root: self.root.clone(),
                });
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.join_workers();
    }

    /// Wait for the next result. `None` when the workers are done or the
    /// scan was cancelled, whichever comes first.
    fn recv(&self) -> Option<Entry> {
        loop {
            match self.results.recv_timeout(CANCEL_POLL) {
                Ok(entry) => return Some(entry),
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => {
                    if self.supervisor.is_cancelled() {
                        self.supervisor.wake_all();
                        return None;
                    }
                }
            }
        }
    }

    /// Drain every result, then sort. Empty if cancelled while draining.
    fn sort_all(&mut self, order: SortOrder) -> std::vec::IntoIter<Entry> {
        let mut entries = Vec::new();
        while let Some(entry) = self.recv() {
            entries.push(entry);
        }
        if self.supervisor.is_cancelled() {
            return Vec::new().into_iter();
        }
        self.finish();

        if order.needs_stat() {
            entries.par_iter().for_each(|entry| {
                entry.stat();
            });
        }
        entries.par_sort_by(|a, b| order.compare(a, b));
        entries.into_iter()
    }
}

impl Iterator for ScanStream {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.supervisor.is_cancelled() {
            return None;
        }

        if let Some(order) = self.order {
            if self.sorted.is_none() {
                let sorted = self.sort_all(order);
                self.sorted = Some(sorted);
            }
            return self.sorted.as_mut().and_then(Iterator::next);
        }

        if self.finished {
            return None;
        }
        match self.recv() {
            Some(entry) => Some(entry),
            None if self.supervisor.is_cancelled() => None,
            None => {
                self.finish();
                None
            }
        }
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        if !self.finished {
            self.supervisor.stop();
        }
        self.join_workers();
    }
}

/// Directory walker used when the index can't answer for a root
pub struct FallbackScanner {
    lister: Arc<dyn DirLister>,
    reporter: Arc<dyn Reporter>,
    workers: usize,
}

impl FallbackScanner {
    pub fn new(lister: Arc<dyn DirLister>, reporter: Arc<dyn Reporter>, workers: usize) -> Self {
        Self {
            lister,
            reporter,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start scanning `root`. The root itself is never yielded.
    pub fn scan(
        &self,
        root: &Path,
        filter: Arc<ListingFilter>,
        recurse: bool,
        order: Option<SortOrder>,
        cancel: CancelFlag,
    ) -> Result<ScanStream> {
        let supervisor = Arc::new(Supervisor::new(cancel));
        let (tx, rx) = mpsc::channel();

        let mut stream = ScanStream {
            root: root.to_path_buf(),
            results: rx,
            supervisor: Arc::clone(&supervisor),
            reporter: Arc::clone(&self.reporter),
            workers: Vec::with_capacity(self.workers),
            order,
            sorted: None,
            finished: false,
        };

        supervisor.submit(root.to_path_buf());

        for i in 0..self.workers {
            let worker = Worker {
                supervisor: Arc::clone(&supervisor),
                lister: Arc::clone(&self.lister),
                filter: Arc::clone(&filter),
                reporter: Arc::clone(&self.reporter),
                recurse,
                results: tx.clone(),
            };
            // On error the stream is dropped, which stops the workers already running
            let handle = thread::Builder::new()
                .name(format!("hybridfind-scan-{}", i))
                .spawn(move || worker.run())?;
            stream.workers.push(handle);
        }

        // Workers hold the only senders; the channel closes when the last one exits
        drop(tx);
        supervisor.wake_all();

        Ok(stream)
    }

    /// Look up a single path directly, for exact-path queries
    pub fn lookup(&self, path: &Path, filter: &ListingFilter) -> Option<Entry> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(source) => {
                let error = ScanError {
                    path: path.to_path_buf(),
                    source,
                };
                if !error.is_not_found() {
                    self.reporter.report(SearchEvent::scan_failed(&error));
                }
                return None;
            }
        };

        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let name = path.file_name()?.to_string_lossy();
        filter
            .matches(&name, kind)
            .then(|| Entry::scanned(path.to_path_buf(), kind))
    }
}
