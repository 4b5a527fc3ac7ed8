//! Sorted-array inverted index.
//!
//! This module provides the index entry store, the indexer that builds and
//! queries it, and the document adapters that feed it.
//!
//! # Module Structure
//!
//! - `entry`: entry record, entry kinds and ordering rules
//! - `document`: document table
//! - `store`: committed index state (entries, documents, hashes, keywords)
//! - `format`: versioned binary persistence
//! - `indexer`: batch build, incremental merge and range search
//! - `search`: index query tokens and ranked results
//! - `settings`: typed index settings
//! - `adapter`: document producers (files, host objects)
//! - `build`: stepwise build driver with progress reporting

pub mod adapter;
pub mod build;
pub mod document;
pub mod entry;
pub mod format;
pub mod indexer;
pub mod search;
pub mod settings;
pub mod store;

pub use build::{BuildReport, BuildStatus, BuildTask, ProgressEvent, ProgressSink};
pub use document::SearchDocument;
pub use entry::{IndexEntry, IndexType, SearchOperator};
pub use indexer::{BuildHandle, IndexState, Indexer};
pub use search::SearchResult;
pub use settings::IndexSettings;
