//! # hybridfind - index-first file search with a live-scan fallback
//!
//! hybridfind answers file searches from an external file index when it can
//! and walks the filesystem when it can't. Callers get one lazy stream of
//! [`Entry`] values no matter which backend produced them.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`query`] - Query building, validation, filters and index query text
//! - [`backend`] - Index service contract, socket client and in-memory backend
//! - [`search`] - Coverage probing, fallback scanner and the orchestrator
//! - [`entry`] - The unified result record with lazily computed metadata
//! - [`output`] - Result formatting (colored paths or JSON lines)
//! - [`utils`] - Configuration and text helpers
//!
//! ## Quick Start
//!
//! ```no_run
//! use hybridfind::backend::SocketBackend;
//! use hybridfind::query::{MediaType, QueryBuilder};
//! use hybridfind::search::{SearchItem, Searcher};
//! use hybridfind::utils::SearchConfig;
//! use std::sync::Arc;
//!
//! let config = SearchConfig::load().unwrap();
//! let searcher = Searcher::new(Arc::new(SocketBackend::from_config(&config)))
//!     .with_config(config);
//!
//! let query = QueryBuilder::new()
//!     .root("/home/me/Pictures")
//!     .substring("beach")
//!     .media_type(MediaType::Images)
//!     .build()
//!     .unwrap();
//!
//! for item in searcher.search(&query).unwrap() {
//!     match item.unwrap() {
//!         SearchItem::Entry(entry) => println!("{}", entry.path().display()),
//!         SearchItem::Timeout => eprintln!("results incomplete"),
//!     }
//! }
//! ```
//!
//! ## Coverage
//!
//! One index query covers every root. A root the index returns nothing for
//! is probed with a one-row query; if the probe finds nothing either, the
//! root is walked directly by a pool of worker threads. An indexed but empty
//! root is walked too, which is harmless.

pub mod backend;
pub mod entry;
pub mod error;
pub mod output;
pub mod query;
pub mod search;
pub mod utils;

pub use entry::{Entry, EntryKind};
pub use error::{Result, SearchError};
pub use query::{QueryBuilder, SearchQuery};
pub use search::{SearchItem, SearchStream, Searcher};
