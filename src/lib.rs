//! # Quarry
//!
//! A search and indexing library for heterogeneous documents (files, scene
//! objects, log lines, menu entries).
//!
//! ## Features
//!
//! - Sorted-array inverted index with prefix variations and score ranking
//! - Incremental updates with stale-document eviction
//! - Versioned binary persistence
//! - Typed query engine with filters, operator dispatch and nested queries
//! - Lazy query enumerables for progress-friendly evaluation
// Core modules
pub mod engine;
mod error;
pub mod index;
pub mod query;
pub mod storage;
mod util;

// Re-exports for the public API
pub use engine::Engine;
pub use engine::config::EngineConfig;
pub use error::{QuarryError, Result};
pub use index::adapter::DocumentAdapter;
pub use index::indexer::{IndexState, Indexer};
pub use index::search::SearchResult;
pub use index::settings::IndexSettings;
pub use query::{Query, QueryEngine, QueryEngineOptions, QueryError};
pub use storage::{FileStorage, MemoryStorage, Storage};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
