//! Committed index state.

use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::index::document::DocumentTable;
use crate::index::entry::IndexEntry;

/// Everything a search reads and a persisted index holds.
///
/// The entry array sits behind an `Arc` so that a merge can replace it with a
/// single pointer swap while searches keep using the array they started with.
#[derive(Debug, Clone, Default)]
pub struct IndexStore {
    pub entries: Arc<Vec<IndexEntry>>,
    pub documents: DocumentTable,
    /// Document id to content hash, used for staleness checks.
    pub hashes: AHashMap<String, String>,
    /// `name:` and `name:value` strings for autocompletion.
    pub keywords: BTreeSet<String>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries = Arc::new(Vec::new());
        self.documents.clear();
        self.hashes.clear();
        self.keywords.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Everything a build stages before its merge commits it.
///
/// Hashes and keywords travel with the entries so that an aborted build
/// leaves the committed store exactly as it was.
#[derive(Debug, Default)]
pub struct PendingBatch {
    pub entries: Vec<IndexEntry>,
    pub hashes: AHashMap<String, String>,
    pub removed_hashes: AHashSet<String>,
    pub keywords: BTreeSet<String>,
}

impl PendingBatch {
    pub fn set_hash(&mut self, id: &str, hash: String) {
        self.removed_hashes.remove(id);
        self.hashes.insert(id.to_string(), hash);
    }

    pub fn remove_hash(&mut self, id: &str) {
        self.hashes.remove(id);
        self.removed_hashes.insert(id.to_string());
    }

    /// Apply the staged hashes and keywords to `store`.
    pub fn commit_into(self, store: &mut IndexStore) {
        for id in &self.removed_hashes {
            store.hashes.remove(id);
        }
        store.hashes.extend(self.hashes);
        store.keywords.extend(self.keywords);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_hash_changes_apply_in_order() {
        let mut store = IndexStore::new();
        store.hashes.insert("a".to_string(), "old".to_string());
        store.hashes.insert("b".to_string(), "old".to_string());

        let mut batch = PendingBatch::default();
        batch.set_hash("a", "new".to_string());
        batch.remove_hash("b");
        batch.remove_hash("c");
        batch.set_hash("c", "fresh".to_string());
        batch.keywords.insert("t:".to_string());
        batch.commit_into(&mut store);

        assert_eq!(store.hashes.get("a").map(String::as_str), Some("new"));
        assert!(!store.hashes.contains_key("b"));
        assert_eq!(store.hashes.get("c").map(String::as_str), Some("fresh"));
        assert!(store.keywords.contains("t:"));
    }
}
