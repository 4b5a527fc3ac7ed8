//! Document adapters.
//!
//! An adapter walks one kind of collection (files, host objects) and turns
//! each document into `add_*` calls on an [`Indexer`]. The indexer never sees
//! host types; everything reaches it as words, numbers and properties.

pub mod custom;
pub mod file;
pub mod object;

pub use custom::{CustomIndexContext, CustomIndexer, CustomIndexerProvider, CustomIndexerRegistry};
pub use file::FileAdapter;
pub use object::{HostObject, ObjectAdapter, ObjectSource, PropertyValue};

use crate::error::Result;
use crate::index::indexer::Indexer;
use crate::index::settings::IndexSettings;
use crate::util::glob::{self, GlobPattern};

/// A producer of documents for one index.
pub trait DocumentAdapter: Send {
    /// Adapter name, for logs.
    fn name(&self) -> &str;

    /// Seed locations the adapter walks.
    fn roots(&self) -> Vec<String>;

    /// Every document id the index should contain, already filtered through
    /// [`skip_entry`](Self::skip_entry).
    fn dependencies(&mut self) -> Result<Vec<String>>;

    /// Staleness fingerprint of a document, or `None` if it no longer exists.
    fn document_hash(&self, id: &str) -> Option<String>;

    /// Pull the attributes of `id` and feed them to `indexer`.
    fn index_document(&mut self, id: &str, check_exists: bool, indexer: &Indexer) -> Result<()>;

    /// Whether `path` is excluded from the index.
    fn skip_entry(&self, path: &str, check_roots: bool) -> bool;
}

/// Files the index itself produces. Never indexed.
const GENERATED_SUFFIXES: &[&str] = &[".index", ".index.tmp", ".meta"];

pub fn is_generated_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    GENERATED_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Include/exclude rules shared by adapters.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    roots: Vec<String>,
    includes: Vec<GlobPattern>,
    excludes: Vec<GlobPattern>,
}

impl EntryFilter {
    pub fn from_settings(settings: &IndexSettings) -> Result<Self> {
        Ok(EntryFilter {
            roots: settings
                .roots
                .iter()
                .map(|r| normalize_path(r).trim_end_matches('/').to_string())
                .filter(|r| !r.is_empty() && r != ".")
                .collect(),
            includes: settings.include_patterns()?,
            excludes: settings.exclude_patterns()?,
        })
    }

    /// Whether `path` lies under one of the roots (always true without roots).
    pub fn in_roots(&self, path: &str) -> bool {
        self.roots.is_empty()
            || self.roots.iter().any(|root| {
                path.eq_ignore_ascii_case(root)
                    || path
                        .get(..root.len() + 1)
                        .is_some_and(|head| head.eq_ignore_ascii_case(&format!("{root}/")))
            })
    }

    pub fn skip(&self, path: &str, check_roots: bool) -> bool {
        let path = normalize_path(path);
        if is_generated_file(&path) {
            return true;
        }
        if check_roots && !self.in_roots(&path) {
            return true;
        }
        if !self.includes.is_empty() && !glob::any_match(&self.includes, &path) {
            return true;
        }
        glob::any_match(&self.excludes, &path)
    }
}

/// Forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_files_are_skipped() {
        let filter = EntryFilter::default();
        assert!(filter.skip("Library/search.index", false));
        assert!(filter.skip("Library/search.index.tmp", false));
        assert!(filter.skip("Assets/Tree.prefab.meta", false));
        assert!(!filter.skip("Assets/Tree.prefab", false));
    }

    #[test]
    fn test_roots_includes_excludes() {
        let settings = IndexSettings::default()
            .with_roots(["Assets/"])
            .with_includes(vec!["*.prefab".to_string(), "*.png".to_string()])
            .with_excludes(vec!["**/Temp/**".to_string()]);
        let filter = EntryFilter::from_settings(&settings).unwrap();

        assert!(!filter.skip("Assets/Tree.prefab", true));
        assert!(filter.skip("Packages/Tree.prefab", true));
        assert!(!filter.skip("Packages/Tree.prefab", false));
        assert!(filter.skip("Assets/Tree.cs", true));
        assert!(filter.skip("Assets/Temp/Tree.png", true));
        assert!(!filter.skip(r"Assets\Art\Leaf.png", true));
    }
}
