//! Document table.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// One indexed unit identified by a stable external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Stable external key (file path, object global id, ...).
    pub id: String,
    /// Optional host-defined payload.
    pub metadata: Option<String>,
}

impl SearchDocument {
    pub fn new(id: impl Into<String>, metadata: Option<String>) -> Self {
        SearchDocument {
            id: id.into(),
            metadata,
        }
    }
}

/// Append-only list of documents with an id lookup.
///
/// A document's position is its `index` in every entry that refers to it.
/// Positions are never reused until the table is cleared by a full rebuild.
#[derive(Debug, Clone, Default)]
pub struct DocumentTable {
    documents: Vec<SearchDocument>,
    by_id: AHashMap<String, i32>,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document and return its index.
    ///
    /// With `check_exists`, a document already present keeps its index and
    /// only has its metadata replaced.
    pub fn add(&mut self, id: &str, metadata: Option<String>, check_exists: bool) -> i32 {
        if check_exists {
            if let Some(&index) = self.by_id.get(id) {
                if metadata.is_some() {
                    self.documents[index as usize].metadata = metadata;
                }
                return index;
            }
        }

        let index = self.documents.len() as i32;
        self.documents.push(SearchDocument::new(id, metadata));
        self.by_id.insert(id.to_string(), index);
        index
    }

    pub fn get(&self, index: i32) -> Option<&SearchDocument> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.documents.get(i))
    }

    pub fn find(&self, id: &str) -> Option<i32> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchDocument> {
        self.documents.iter()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.by_id.clear();
    }

    pub(crate) fn from_documents(documents: Vec<SearchDocument>) -> Self {
        let by_id = documents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i as i32))
            .collect();
        DocumentTable { documents, by_id }
    }
}
