pub mod config;

use std::sync::Arc;

use ahash::AHashSet;

use crate::error::Result;
use crate::index::adapter::DocumentAdapter;
use crate::index::build::{BuildReport, BuildTask};
use crate::index::indexer::{Indexer, PersistCallback};
use crate::index::search::SearchResult;
use crate::storage::{MemoryStorage, Storage};

use self::config::EngineConfig;

/// An index session: one indexer, the adapter that feeds it, and the storage
/// its serialized form lives in.
///
/// The engine is a facade over [`Indexer`] and [`BuildTask`]. It decides
/// between full and incremental builds, persists every committed build and
/// restores the last one on [`load`](Self::load).
pub struct Engine<A: DocumentAdapter> {
    config: EngineConfig,
    indexer: Indexer,
    adapter: A,
    storage: Arc<dyn Storage>,
}

impl<A: DocumentAdapter> std::fmt::Debug for Engine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("indexer", &self.indexer)
            .field("adapter", &self.adapter.name())
            .field("storage", &self.storage)
            .finish()
    }
}

impl<A: DocumentAdapter> Engine<A> {
    /// Create an engine.
    ///
    /// # Arguments
    ///
    /// * `adapter` - The document producer.
    /// * `storage` - Where `config.index_file` is persisted.
    /// * `config` - The engine configuration.
    pub fn new(adapter: A, storage: Arc<dyn Storage>, config: EngineConfig) -> Result<Self> {
        let indexer = Indexer::new(config.settings.clone())?;
        Ok(Self {
            config,
            indexer,
            adapter,
            storage,
        })
    }

    /// Create an engine backed by a fresh [`MemoryStorage`].
    pub fn in_memory(adapter: A, config: EngineConfig) -> Result<Self> {
        Self::new(adapter, Arc::new(MemoryStorage::new()), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn is_ready(&self) -> bool {
        self.indexer.is_ready()
    }

    /// Writes the committed index to storage from the merge worker. Failures
    /// are logged; the next build writes it again.
    fn persist_callback(&self) -> Option<PersistCallback> {
        let name = self.config.index_file.clone()?;
        let storage = self.storage.clone();
        Some(Box::new(move |bytes: Vec<u8>| {
            match storage.write_atomic(&name, &bytes) {
                Ok(()) => log::debug!("persisted index '{name}' ({} bytes)", bytes.len()),
                Err(e) => log::warn!("failed to persist index '{name}': {e}"),
            }
        }))
    }

    /// A stepwise full build, for hosts that drive the build themselves.
    pub fn build_task(&mut self) -> Result<BuildTask<'_, A>> {
        let persist = self.persist_callback();
        let task = BuildTask::full(&self.indexer, &mut self.adapter)?;
        Ok(match persist {
            Some(persist) => task.with_persist(persist),
            None => task,
        })
    }

    /// Rebuild the whole index and wait for it.
    pub fn build(&mut self) -> Result<BuildReport> {
        self.build_task()?.run()
    }

    /// Re-index `changed` and evict `removed`, keeping every other document.
    pub fn incremental_update(&mut self, changed: &[String], removed: &[String]) -> Result<BuildReport> {
        let persist = self.persist_callback();
        let task = BuildTask::incremental(&self.indexer, &mut self.adapter, changed, removed);
        match persist {
            Some(persist) => task.with_persist(persist).run(),
            None => task.run(),
        }
    }

    /// Bring the index up to date with the adapter.
    ///
    /// Without a committed index this is a full build. Otherwise the
    /// adapter's document hashes are compared with the recorded ones and only
    /// the difference is re-indexed. Returns `None` when nothing changed.
    pub fn refresh(&mut self) -> Result<Option<BuildReport>> {
        if !self.indexer.is_searchable() {
            return self.build().map(Some);
        }

        let (changed, removed) = self.stale_documents()?;
        if changed.is_empty() && removed.is_empty() {
            log::debug!("index '{}' is up to date", self.indexer.name());
            return Ok(None);
        }
        self.incremental_update(&changed, &removed).map(Some)
    }

    /// Documents whose hash differs from the recorded one, and recorded
    /// documents the adapter no longer lists.
    pub fn stale_documents(&mut self) -> Result<(Vec<String>, Vec<String>)> {
        let current = self.adapter.dependencies()?;
        let changed: Vec<String> = current
            .iter()
            .filter(|id| match self.adapter.document_hash(id) {
                Some(hash) => self.indexer.is_document_stale(id, &hash),
                None => true,
            })
            .cloned()
            .collect();

        let current: AHashSet<&str> = current.iter().map(String::as_str).collect();
        let removed: Vec<String> = self
            .indexer
            .hashed_documents()
            .into_iter()
            .filter(|id| !current.contains(id.as_str()))
            .collect();
        Ok((changed, removed))
    }

    /// Ranked documents matching an index query.
    pub fn search(&self, text: &str) -> Vec<SearchResult> {
        self.indexer
            .search(text, self.config.max_score, self.config.result_limit)
    }

    /// Document ids of [`search`](Self::search) results, best first.
    pub fn search_ids(&self, text: &str) -> Vec<String> {
        self.search(text).into_iter().map(|result| result.id).collect()
    }

    pub fn keywords(&self) -> Vec<String> {
        self.indexer.keywords()
    }

    pub fn complete(&self, prefix: &str) -> Vec<String> {
        self.indexer.complete(prefix)
    }

    /// Restore the persisted index.
    ///
    /// Returns `false` when there is nothing usable to load: no index file is
    /// configured, it does not exist, or it was written by an incompatible
    /// version or is corrupt. In those cases the committed index is untouched.
    pub fn load(&self) -> Result<bool> {
        let Some(name) = &self.config.index_file else {
            return Ok(false);
        };
        if !self.storage.file_exists(name) {
            return Ok(false);
        }

        let bytes = self.storage.read_all(name)?;
        let loaded = self.indexer.read(&bytes, true).and_then(|compatible| {
            if compatible {
                self.indexer.load_bytes(&bytes).map(|()| true)
            } else {
                log::info!("index '{name}' has an incompatible version, ignoring it");
                Ok(false)
            }
        });
        match loaded {
            Ok(true) => {
                log::info!(
                    "loaded index '{name}': {} documents, {} entries",
                    self.indexer.document_count(),
                    self.indexer.entry_count()
                );
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) if e.is_format_error() => {
                log::warn!("index '{name}' is corrupt, ignoring it: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Load the persisted index, or build one when there is none.
    pub fn open(&mut self) -> Result<Option<BuildReport>> {
        if self.load()? {
            return Ok(None);
        }
        self.build().map(Some)
    }

    /// Persist the committed index now. A no-op without `index_file`.
    pub fn save(&self) -> Result<()> {
        let Some(name) = &self.config.index_file else {
            return Ok(());
        };
        let bytes = self.indexer.to_bytes()?;
        self.storage.write_atomic(name, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::index::settings::IndexSettings;

    /// Documents are words; the hash is a revision number.
    #[derive(Default)]
    struct Notes {
        notes: BTreeMap<String, (String, u32)>,
    }

    impl Notes {
        fn put(&mut self, id: &str, text: &str) {
            let revision = self.notes.get(id).map_or(0, |(_, r)| r + 1);
            self.notes.insert(id.to_string(), (text.to_string(), revision));
        }
    }

    impl DocumentAdapter for Notes {
        fn name(&self) -> &str {
            "notes"
        }

        fn roots(&self) -> Vec<String> {
            Vec::new()
        }

        fn dependencies(&mut self) -> Result<Vec<String>> {
            Ok(self.notes.keys().cloned().collect())
        }

        fn document_hash(&self, id: &str) -> Option<String> {
            self.notes.get(id).map(|(_, revision)| revision.to_string())
        }

        fn index_document(&mut self, id: &str, check_exists: bool, indexer: &Indexer) -> Result<()> {
            let Some((text, _)) = self.notes.get(id) else {
                return Ok(());
            };
            let index = indexer.add_document(id, None, check_exists);
            indexer.add_words(text, index);
            Ok(())
        }

        fn skip_entry(&self, _path: &str, _check_roots: bool) -> bool {
            false
        }
    }

    fn engine() -> Engine<Notes> {
        let mut notes = Notes::default();
        notes.put("a", "apple pie");
        notes.put("b", "banana bread");
        let config = EngineConfig::builder(IndexSettings::new("notes"))
            .index_file("notes.index")
            .build();
        Engine::in_memory(notes, config).unwrap()
    }

    #[test]
    fn test_build_and_search() {
        let mut engine = engine();
        assert!(!engine.is_ready());
        let report = engine.build().unwrap();
        assert_eq!(report.indexed, 2);
        assert!(engine.is_ready());
        assert_eq!(engine.search_ids("app"), vec!["a"]);
        assert_eq!(engine.search_ids("bread"), vec!["b"]);
        assert!(engine.storage().file_exists("notes.index"));
    }

    #[test]
    fn test_refresh_reindexes_only_stale_documents() {
        let mut engine = engine();
        engine.build().unwrap();
        assert!(engine.refresh().unwrap().is_none());

        engine.adapter_mut().put("a", "cherry tart");
        engine.adapter_mut().notes.remove("b");
        engine.adapter_mut().put("c", "carrot cake");

        let (mut changed, removed) = engine.stale_documents().unwrap();
        changed.sort();
        assert_eq!(changed, vec!["a", "c"]);
        assert_eq!(removed, vec!["b"]);

        let report = engine.refresh().unwrap().unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.removed, 1);
        assert!(engine.search_ids("apple").is_empty());
        assert!(engine.search_ids("banana").is_empty());
        assert_eq!(engine.search_ids("cherry"), vec!["a"]);
        assert_eq!(engine.search_ids("carrot"), vec!["c"]);
    }

    #[test]
    fn test_aborted_update_is_retried_by_refresh() {
        let mut engine = engine();
        engine.build().unwrap();
        engine.adapter_mut().put("a", "cherry tart");
        engine.adapter_mut().notes.remove("b");
        let (changed, removed) = engine.stale_documents().unwrap();

        // 1. Abort after the first changed document
        let mut task = BuildTask::incremental(&engine.indexer, &mut engine.adapter, &changed, &removed);
        task.step().unwrap();
        engine.indexer.abort();
        assert!(task.run().unwrap().aborted);

        // 2. The committed index and its hashes still describe the old content
        assert_eq!(engine.search_ids("apple"), vec!["a"]);
        assert!(engine.search_ids("cherry").is_empty());
        assert!(engine.indexer().is_document_stale("a", "1"));
        assert_eq!(engine.indexer().document_hash("b").as_deref(), Some("0"));

        // 3. The next refresh picks up both changes again
        let report = engine.refresh().unwrap().unwrap();
        assert_eq!((report.indexed, report.removed), (1, 1));
        assert_eq!(engine.search_ids("cherry"), vec!["a"]);
        assert!(engine.search_ids("banana").is_empty());
        assert!(engine.refresh().unwrap().is_none());
    }

    #[test]
    fn test_load_restores_persisted_index() {
        let mut engine = engine();
        engine.build().unwrap();
        let storage = engine.storage().clone();

        let config = engine.config().clone();
        let reopened = Engine::new(Notes::default(), storage, config).unwrap();
        assert!(reopened.load().unwrap());
        assert!(reopened.is_ready());
        assert_eq!(reopened.search_ids("banana"), vec!["b"]);
    }

    #[test]
    fn test_load_ignores_corrupt_file() {
        let engine = engine();
        engine.storage().write_atomic("notes.index", &[1, 2, 3]).unwrap();
        assert!(!engine.load().unwrap());
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_without_index_file() {
        let config = EngineConfig::new(IndexSettings::new("notes"));
        let mut engine = Engine::in_memory(Notes::default(), config).unwrap();
        assert!(!engine.load().unwrap());
        engine.save().unwrap();
        assert!(engine.open().unwrap().is_some());
        assert!(engine.storage().list_files().unwrap().is_empty());
    }
}
