//! Batch build, incremental merge and search over the sorted entry array.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──▶ Building ──add_*()──▶ Accumulating ──finish()──▶ Merging ──▶ Ready
//!                                                                       │
//!                                                          abort/panic  └──▶ Ready | Idle
//! ```
//!
//! Until a first entry array has been committed, [`Indexer::search`] returns
//! an empty result set instead of blocking. Incremental builds keep serving
//! the previous array until their merge swaps in the new one.
//!
//! # Thread safety
//!
//! [`Indexer`] is a cheap handle over shared state. The committed store sits
//! behind one [`parking_lot::RwLock`] that is only held around each discrete
//! read or write; the merge worker builds the new entry array without holding
//! it and swaps the `Arc` in under a short write lock.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::{AHashMap, AHashSet};
use crossbeam_channel::{Receiver, TryRecvError, bounded};
use parking_lot::{Mutex, RwLock};
use rayon::slice::ParallelSliceMut;

use crate::error::{QuarryError, Result};
use crate::index::document::SearchDocument;
use crate::index::entry::{EXACT_CRC, IndexEntry, IndexType, canonical_cmp, identity_cmp};
use crate::index::format;
use crate::index::search::{SearchResult, parse_token, search_token, split_query};
use crate::index::settings::IndexSettings;
use crate::index::store::{IndexStore, PendingBatch};
use crate::util::hash::{hash_exact_key, hash_key, hash_name};

/// Callback receiving the serialized index after a successful merge.
pub type PersistCallback = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;

/// Build lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Nothing committed yet.
    Idle,
    /// `start()` was called; no entries added yet.
    Building,
    /// Entries are being added to the batch.
    Accumulating,
    /// The batch is being merged into the committed array.
    Merging,
    /// The committed array is searchable.
    Ready,
}

struct IndexerInner {
    settings: IndexSettings,
    store: RwLock<IndexStore>,
    /// Entries, hashes and keywords staged by the current build.
    batch: Mutex<PendingBatch>,
    state: Mutex<IndexState>,
    abort_requested: AtomicBool,
    aborted: AtomicBool,
    /// Set once an entry array has been committed; cleared by `start(true)`.
    committed: AtomicBool,
    /// Raw query token to the number of documents it last matched.
    match_counts: Mutex<AHashMap<String, usize>>,
}

/// Builds and searches one sorted-array index.
///
/// # Example
///
/// ```
/// use quarry::{IndexSettings, Indexer};
///
/// let indexer = Indexer::new(IndexSettings::default()).unwrap();
/// indexer.start(true);
/// let doc = indexer.add_document("fruit/apple.txt", None, true);
/// indexer.add_word("apple", 2, 5, doc, 100);
/// indexer.finish(None, None).wait().unwrap();
///
/// let results = indexer.search("app", i32::MAX, 100);
/// assert_eq!(results[0].id, "fruit/apple.txt");
/// ```
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.inner.store.read();
        f.debug_struct("Indexer")
            .field("name", &self.inner.settings.name)
            .field("state", &self.state())
            .field("documents", &store.documents.len())
            .field("entries", &store.entries.len())
            .finish()
    }
}

/// Handle on a running merge.
///
/// The worker reports its outcome over a one-slot channel, so the handle can
/// be polled from a host loop or waited on.
#[derive(Debug)]
pub struct BuildHandle {
    rx: Receiver<Result<()>>,
}

impl BuildHandle {
    fn completed(result: Result<()>) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(result);
        BuildHandle { rx }
    }

    /// Whether the outcome is available.
    pub fn is_finished(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Take the outcome if the merge is done.
    pub fn try_wait(&self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(QuarryError::internal(
                "merge worker exited without reporting",
            ))),
        }
    }

    /// Block until the merge completes.
    pub fn wait(self) -> Result<()> {
        self.rx
            .recv()
            .map_err(|_| QuarryError::internal("merge worker exited without reporting"))?
    }
}

impl Indexer {
    pub fn new(settings: IndexSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Indexer {
            inner: Arc::new(IndexerInner {
                settings,
                store: RwLock::new(IndexStore::new()),
                batch: Mutex::new(PendingBatch::default()),
                state: Mutex::new(IndexState::Idle),
                abort_requested: AtomicBool::new(false),
                aborted: AtomicBool::new(false),
                committed: AtomicBool::new(false),
                match_counts: Mutex::new(AHashMap::new()),
            }),
        })
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.inner.settings
    }

    pub fn name(&self) -> &str {
        &self.inner.settings.name
    }

    pub fn state(&self) -> IndexState {
        *self.inner.state.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == IndexState::Ready
    }

    fn set_state(&self, state: IndexState) {
        *self.inner.state.lock() = state;
    }

    // ── Build lifecycle ─────────────────────────────────────────────

    /// Begin a new batch. With `clear`, the committed store is emptied too
    /// and document indices restart at zero.
    pub fn start(&self, clear: bool) {
        *self.inner.batch.lock() = PendingBatch::default();
        self.inner.match_counts.lock().clear();
        self.inner.abort_requested.store(false, Ordering::SeqCst);
        self.inner.aborted.store(false, Ordering::SeqCst);
        if clear {
            self.inner.store.write().clear();
            self.inner.committed.store(false, Ordering::SeqCst);
        }
        self.set_state(IndexState::Building);
        log::debug!("index '{}': build started (clear={clear})", self.name());
    }

    /// Ask a running build to stop. The batch is discarded and the committed
    /// array is left untouched.
    pub fn abort(&self) {
        self.inner.abort_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.inner.abort_requested.load(Ordering::SeqCst)
    }

    /// Whether the last build ended without committing.
    pub fn was_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    fn push_entries(&self, entries: impl IntoIterator<Item = IndexEntry>) {
        self.inner.batch.lock().entries.extend(entries);

        let mut state = self.inner.state.lock();
        if *state == IndexState::Building {
            *state = IndexState::Accumulating;
        }
    }

    /// Number of entries waiting in the current batch.
    pub fn pending_entries(&self) -> usize {
        self.inner.batch.lock().entries.len()
    }

    /// Merge the batch into the committed array on a worker thread.
    ///
    /// Entries of `removed_ids` already in the committed array are stripped
    /// first; pass re-indexed documents here too so their stale entries go
    /// away. The union is sorted, duplicates are removed and the result
    /// replaces the committed array in one swap, together with the hashes
    /// and keywords staged since `start()`. `persist` receives the
    /// serialized index once the swap is done.
    pub fn finish(
        &self,
        removed_ids: Option<&[String]>,
        persist: Option<PersistCallback>,
    ) -> BuildHandle {
        let batch = std::mem::take(&mut *self.inner.batch.lock());

        let removed: AHashSet<i32> = {
            let store = self.inner.store.read();
            removed_ids
                .unwrap_or_default()
                .iter()
                .filter_map(|id| store.documents.find(id))
                .collect()
        };

        if self.is_abort_requested() {
            self.mark_aborted();
            return BuildHandle::completed(Err(QuarryError::Aborted));
        }

        self.set_state(IndexState::Merging);
        let indexer = self.clone();
        let (tx, rx) = bounded(1);
        std::thread::spawn(move || {
            let result = match catch_unwind(AssertUnwindSafe(|| indexer.merge(batch, &removed))) {
                Ok(Ok(())) => {
                    log::info!(
                        "index '{}': committed {} entries",
                        indexer.name(),
                        indexer.entry_count()
                    );
                    if let Some(persist) = persist {
                        match indexer.to_bytes() {
                            Ok(bytes) => persist(bytes),
                            Err(e) => {
                                log::warn!("index '{}': serialize failed: {e}", indexer.name())
                            }
                        }
                    }
                    Ok(())
                }
                Ok(Err(e)) => {
                    indexer.mark_aborted();
                    Err(e)
                }
                Err(_) => {
                    indexer.mark_aborted();
                    Err(QuarryError::internal("index merge panicked"))
                }
            };
            // The receiver may already be gone
            let _ = tx.send(result);
        });

        BuildHandle { rx }
    }

    fn merge(&self, mut batch: PendingBatch, removed: &AHashSet<i32>) -> Result<()> {
        let committed = self.inner.store.read().entries.clone();

        let mut merged: Vec<IndexEntry> = committed
            .iter()
            .filter(|e| !removed.contains(&e.index))
            .copied()
            .collect();
        merged.extend(std::mem::take(&mut batch.entries));

        if self.is_abort_requested() {
            return Err(QuarryError::Aborted);
        }

        merged.par_sort_by(identity_cmp);
        merged.dedup_by(|next, kept| next == kept);
        merged.par_sort_by(canonical_cmp);

        if self.is_abort_requested() {
            return Err(QuarryError::Aborted);
        }

        let mut store = self.inner.store.write();
        store.entries = Arc::new(merged);
        batch.commit_into(&mut store);
        drop(store);
        self.inner.committed.store(true, Ordering::SeqCst);
        self.set_state(IndexState::Ready);
        Ok(())
    }

    fn mark_aborted(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        *self.inner.batch.lock() = PendingBatch::default();
        let committed = self.inner.committed.load(Ordering::SeqCst);
        self.set_state(if committed {
            IndexState::Ready
        } else {
            IndexState::Idle
        });
        log::warn!("index '{}': build aborted, batch discarded", self.name());
    }

    // ── Documents, hashes and keywords ──────────────────────────────

    /// Register a document and return its index. See [`DocumentTable::add`](crate::index::document::DocumentTable::add).
    pub fn add_document(&self, id: &str, metadata: Option<String>, check_exists: bool) -> i32 {
        self.inner
            .store
            .write()
            .documents
            .add(id, metadata, check_exists)
    }

    pub fn document(&self, index: i32) -> Option<SearchDocument> {
        self.inner.store.read().documents.get(index).cloned()
    }

    pub fn find_document(&self, id: &str) -> Option<i32> {
        self.inner.store.read().documents.find(id)
    }

    pub fn document_count(&self) -> usize {
        self.inner.store.read().documents.len()
    }

    /// Whether a batch is open, so hash and keyword changes must be staged.
    fn is_building(&self) -> bool {
        matches!(
            self.state(),
            IndexState::Building | IndexState::Accumulating
        )
    }

    /// Record the content hash of `id`. During a build the hash is staged and
    /// only becomes visible once the merge commits.
    pub fn set_document_hash(&self, id: &str, hash: impl Into<String>) {
        if self.is_building() {
            self.inner.batch.lock().set_hash(id, hash.into());
        } else {
            self.inner
                .store
                .write()
                .hashes
                .insert(id.to_string(), hash.into());
        }
    }

    pub fn document_hash(&self, id: &str) -> Option<String> {
        self.inner.store.read().hashes.get(id).cloned()
    }

    /// Forget the hash of `id`; staged like [`set_document_hash`](Self::set_document_hash).
    pub fn remove_document_hash(&self, id: &str) {
        if self.is_building() {
            self.inner.batch.lock().remove_hash(id);
        } else {
            self.inner.store.write().hashes.remove(id);
        }
    }

    /// Ids with a recorded hash.
    pub fn hashed_documents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.store.read().hashes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether `hash` differs from the recorded hash of `id` (or none is recorded).
    pub fn is_document_stale(&self, id: &str, hash: &str) -> bool {
        self.inner.store.read().hashes.get(id).map(String::as_str) != Some(hash)
    }

    pub fn add_keyword(&self, keyword: impl Into<String>) {
        if self.is_building() {
            self.inner.batch.lock().keywords.insert(keyword.into());
        } else {
            self.inner.store.write().keywords.insert(keyword.into());
        }
    }

    /// All autocompletion keywords, sorted.
    pub fn keywords(&self) -> Vec<String> {
        self.inner.store.read().keywords.iter().cloned().collect()
    }

    /// Keywords starting with `prefix` (case-insensitive).
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        let store = self.inner.store.read();
        store
            .keywords
            .range::<str, _>((std::ops::Bound::Included(prefix.as_str()), std::ops::Bound::Unbounded))
            .take_while(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    // ── Entry producers ─────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn variation_entries(
        &self,
        text: &str,
        min_variations: usize,
        max_variations: usize,
        crc_of: impl Fn(usize) -> i32,
        kind: IndexType,
        document_index: i32,
        score: i32,
    ) -> Vec<IndexEntry> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }

        let min = min_variations.max(1).min(len);
        let max = max_variations.max(min).min(len);
        let mut entries = Vec::with_capacity(max - min + 2);
        for n in min..=max {
            let prefix: String = chars[..n].iter().collect();
            entries.push(IndexEntry::new(
                hash_key(&prefix),
                crc_of(n),
                kind,
                document_index,
                score,
            ));
        }

        // Full text ranks slightly above its truncated variations
        if len > max_variations {
            entries.push(IndexEntry::new(
                hash_key(text),
                crc_of(len),
                kind,
                document_index,
                score - 1,
            ));
        }
        entries
    }

    /// Index `word` as every prefix of length `min_variations..=max_variations`.
    ///
    /// Configured exact literals (`true`/`false` by default) are stored as one
    /// exact token instead.
    pub fn add_word(
        &self,
        word: &str,
        min_variations: usize,
        max_variations: usize,
        document_index: i32,
        score: i32,
    ) {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return;
        }
        if self.settings().is_exact_literal(&word) {
            self.add_exact_word(&word, document_index, score);
            return;
        }

        let entries = self.variation_entries(
            &word,
            min_variations,
            max_variations,
            |n| n as i32,
            IndexType::Word,
            document_index,
            score,
        );
        self.push_entries(entries);
    }

    /// Index `word` with the configured variation range and base score.
    pub fn add_words(&self, text: &str, document_index: i32) {
        let settings = self.settings();
        for word in split_words(text) {
            self.add_word(
                &word,
                settings.min_variations,
                settings.max_variations,
                document_index,
                settings.base_score,
            );
        }
    }

    /// Index `word` so that it only matches the complete word.
    pub fn add_exact_word(&self, word: &str, document_index: i32, score: i32) {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return;
        }
        self.push_entries([IndexEntry::new(
            hash_key(&word),
            EXACT_CRC,
            IndexType::Word,
            document_index,
            score,
        )]);
    }

    /// Index a numeric value under property `name`.
    pub fn add_number(&self, name: &str, value: f64, document_index: i32, score: i32) {
        if value.is_nan() {
            return;
        }
        let name = name.trim().to_lowercase();
        self.push_entries([IndexEntry::from_number(
            value,
            hash_name(&name),
            document_index,
            score,
        )]);
    }

    /// Index a property value.
    ///
    /// The value gets the same prefix variations as [`add_word`](Self::add_word),
    /// keyed by the property name so different properties never collide.
    /// With `exact`, a full-value entry answering `name=value` is added as well.
    /// With `save_keyword`, `name:` and `name:value` become autocompletion keywords.
    #[allow(clippy::too_many_arguments)]
    pub fn add_property(
        &self,
        name: &str,
        value: &str,
        min_variations: usize,
        max_variations: usize,
        document_index: i32,
        score: i32,
        save_keyword: bool,
        exact: bool,
    ) {
        let name = name.trim().to_lowercase();
        let value = value.trim().to_lowercase();
        if name.is_empty() {
            return;
        }
        let crc = hash_name(&name);

        let mut entries = Vec::new();
        let literal = self.settings().is_exact_literal(&value);
        if !literal && !value.is_empty() {
            entries = self.variation_entries(
                &value,
                min_variations,
                max_variations,
                |_| crc,
                IndexType::Property,
                document_index,
                score,
            );
        }
        if exact || literal {
            entries.push(IndexEntry::new(
                hash_exact_key(&value),
                crc,
                IndexType::Property,
                document_index,
                score,
            ));
        }
        self.push_entries(entries);

        if save_keyword {
            self.add_keyword(format!("{name}:"));
            if !value.is_empty() {
                self.add_keyword(format!("{name}:{value}"));
            }
        }
    }

    /// [`add_property`](Self::add_property) with the configured variation range.
    pub fn add_property_default(
        &self,
        name: &str,
        value: &str,
        document_index: i32,
        score: i32,
        save_keyword: bool,
        exact: bool,
    ) {
        let settings = self.settings();
        self.add_property(
            name,
            value,
            settings.min_variations,
            settings.max_variations,
            document_index,
            score,
            save_keyword,
            exact,
        );
    }

    // ── Search ──────────────────────────────────────────────────────

    pub fn entry_count(&self) -> usize {
        self.inner.store.read().entries.len()
    }

    /// The committed entry array.
    pub fn entries(&self) -> Arc<Vec<IndexEntry>> {
        self.inner.store.read().entries.clone()
    }

    /// Whether a committed entry array is available to [`search`](Self::search).
    ///
    /// Stays true during an incremental build (`start(false)`), so searches keep
    /// answering from the previous array until the merge swaps in the new one.
    pub fn is_searchable(&self) -> bool {
        self.inner.committed.load(Ordering::SeqCst)
    }

    /// Run a multi-token query.
    ///
    /// Tokens are evaluated cheapest first (fewest matches last time, then
    /// longest); each token only scans documents that survived the previous
    /// ones, and the search stops as soon as one token matches nothing.
    pub fn search(&self, query: &str, max_score: i32, limit: usize) -> Vec<SearchResult> {
        if !self.is_searchable() {
            return Vec::new();
        }

        let mut tokens: Vec<_> = split_query(query)
            .iter()
            .filter_map(|raw| parse_token(raw))
            .collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        {
            let counts = self.inner.match_counts.lock();
            tokens.sort_by_key(|t| {
                (
                    counts.get(&t.raw).copied().unwrap_or(0),
                    std::cmp::Reverse(t.raw.chars().count()),
                )
            });
        }

        let entries = self.entries();
        let mut candidates: Option<AHashMap<i32, i64>> = None;
        for token in &tokens {
            let found = search_token(&entries, token, max_score, limit, candidates.as_ref());
            self.inner
                .match_counts
                .lock()
                .insert(token.raw.clone(), found.len());
            if found.is_empty() {
                return Vec::new();
            }

            candidates = Some(match candidates {
                None => found.into_iter().map(|(k, s)| (k, s as i64)).collect(),
                Some(previous) => previous
                    .into_iter()
                    .filter_map(|(k, s)| found.get(&k).map(|&f| (k, s + f as i64)))
                    .collect(),
            });
        }

        let store = self.inner.store.read();
        let mut results: Vec<SearchResult> = candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(index, score)| {
                store.documents.get(index).map(|doc| SearchResult {
                    index,
                    id: doc.id.clone(),
                    score,
                })
            })
            .collect();
        drop(store);

        results.sort();
        results.truncate(limit);
        results
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        format::to_bytes(&self.inner.store.read())
    }

    /// Read a serialized index.
    ///
    /// With `check_version_only`, only the version field is read and the
    /// result says whether it is compatible. Otherwise the whole stream is
    /// parsed and, only if that succeeds, replaces the committed store.
    pub fn read(&self, bytes: &[u8], check_version_only: bool) -> Result<bool> {
        if check_version_only {
            return format::check_version(bytes);
        }

        let store = format::read_index(bytes)?;
        let mut entries = Arc::try_unwrap(store.entries).unwrap_or_else(|arc| (*arc).clone());
        // Files written by older builds may not be in canonical order
        if !entries.is_sorted_by(|a, b| canonical_cmp(a, b).is_le()) {
            entries.par_sort_by(canonical_cmp);
        }

        *self.inner.store.write() = IndexStore {
            entries: Arc::new(entries),
            ..store
        };
        *self.inner.batch.lock() = PendingBatch::default();
        self.inner.match_counts.lock().clear();
        self.inner.committed.store(true, Ordering::SeqCst);
        self.set_state(IndexState::Ready);
        Ok(true)
    }

    /// Load a serialized index, rejecting it entirely on any format error.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.read(bytes, false).map(|_| ())
    }

    /// A snapshot of the keyword set.
    pub fn keyword_set(&self) -> BTreeSet<String> {
        self.inner.store.read().keywords.clone()
    }
}

/// Split text into indexable words: runs of alphanumerics, further split at
/// lower-to-upper case changes (`PlayerController` → `player`, `controller`).
/// The unsplit run is kept too when it was split.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for run in text.split(|c: char| !c.is_alphanumeric()) {
        if run.is_empty() {
            continue;
        }

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut prev_lower = false;
        for c in run.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current);
        }

        if parts.len() > 1 {
            words.push(run.to_lowercase());
        }
        words.extend(parts.into_iter().map(|p| p.to_lowercase()));
    }
    words
}
