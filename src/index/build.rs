//! Stepwise build driver.
//!
//! A [`BuildTask`] indexes one document per [`step`](BuildTask::step) so a
//! host event loop can interleave progress UI or cancellation checks between
//! documents. [`run`](BuildTask::run) pumps the task until it is done.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::error::{QuarryError, Result};
use crate::index::adapter::DocumentAdapter;
use crate::index::indexer::{BuildHandle, Indexer, PersistCallback};

/// Progress notification emitted at document granularity.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Index name.
    pub id: String,
    pub message: String,
    /// Fraction in `0.0..=1.0`.
    pub progress: f32,
    pub finished: bool,
}

/// Receiver of build progress.
pub trait ProgressSink: Send {
    fn report(&mut self, event: &ProgressEvent);
}

impl ProgressSink for Sender<ProgressEvent> {
    fn report(&mut self, event: &ProgressEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.send(event.clone());
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&mut self, _event: &ProgressEvent) {}
}

/// Forwards progress to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, event: &ProgressEvent) {
        log::debug!(
            "index '{}': {:.0}% {}",
            event.id,
            event.progress * 100.0,
            event.message
        );
    }
}

/// Adapts a closure into a [`ProgressSink`].
pub struct CallbackProgress<F>(pub F);

impl<F> ProgressSink for CallbackProgress<F>
where
    F: FnMut(&ProgressEvent) + Send,
{
    fn report(&mut self, event: &ProgressEvent) {
        (self.0)(event)
    }
}

/// Wrap a closure as a progress sink.
pub fn progress_fn<F>(f: F) -> CallbackProgress<F>
where
    F: FnMut(&ProgressEvent) + Send,
{
    CallbackProgress(f)
}

/// Outcome of a build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Documents indexed successfully.
    pub indexed: usize,
    /// Documents that failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Documents evicted without replacement.
    pub removed: usize,
    /// Committed entry count after the merge.
    pub entries: usize,
    /// The build was aborted and nothing was committed.
    pub aborted: bool,
}

/// Result of one [`BuildTask::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStatus {
    /// Documents are still being indexed.
    Running { processed: usize, total: usize },
    /// All documents are indexed; the merge worker is running.
    Merging,
    Done(BuildReport),
}

/// One full or incremental build.
pub struct BuildTask<'a, A: DocumentAdapter + ?Sized> {
    indexer: &'a Indexer,
    adapter: &'a mut A,
    progress: Box<dyn ProgressSink + 'a>,
    persist: Option<PersistCallback>,
    /// Documents to (re)index.
    pending: Vec<String>,
    position: usize,
    check_exists: bool,
    /// Documents whose committed entries are stripped before the merge.
    evicted: Vec<String>,
    removed: Vec<String>,
    report: BuildReport,
    merge: Option<BuildHandle>,
    done: bool,
}

impl<'a, A: DocumentAdapter + ?Sized> BuildTask<'a, A> {
    /// Rebuild the whole index from the adapter's dependency list.
    pub fn full(indexer: &'a Indexer, adapter: &'a mut A) -> Result<Self> {
        let pending = adapter.dependencies()?;
        indexer.start(true);
        log::debug!(
            "index '{}': full build of {} documents with adapter '{}'",
            indexer.name(),
            pending.len(),
            adapter.name()
        );
        Ok(Self::with_documents(indexer, adapter, pending, Vec::new(), Vec::new()))
    }

    /// Re-index `changed` and evict `removed` without touching other documents.
    pub fn incremental(
        indexer: &'a Indexer,
        adapter: &'a mut A,
        changed: &[String],
        removed: &[String],
    ) -> Self {
        indexer.start(false);
        let evicted: Vec<String> = changed.iter().chain(removed).cloned().collect();
        log::debug!(
            "index '{}': incremental update, {} changed, {} removed",
            indexer.name(),
            changed.len(),
            removed.len()
        );
        Self::with_documents(indexer, adapter, changed.to_vec(), evicted, removed.to_vec())
    }

    fn with_documents(
        indexer: &'a Indexer,
        adapter: &'a mut A,
        pending: Vec<String>,
        evicted: Vec<String>,
        removed: Vec<String>,
    ) -> Self {
        BuildTask {
            indexer,
            adapter,
            progress: Box::new(NullProgress),
            persist: None,
            pending,
            position: 0,
            check_exists: true,
            evicted,
            removed,
            report: BuildReport::default(),
            merge: None,
            done: false,
        }
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'a) -> Self {
        self.progress = Box::new(sink);
        self
    }

    /// Receive the serialized index once the merge has committed.
    pub fn with_persist(mut self, persist: PersistCallback) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn total(&self) -> usize {
        self.pending.len()
    }

    fn emit(&mut self, message: String, progress: f32, finished: bool) {
        let event = ProgressEvent {
            id: self.indexer.name().to_string(),
            message,
            progress,
            finished,
        };
        self.progress.report(&event);
    }

    fn index_next(&mut self) {
        let id = self.pending[self.position].clone();
        self.position += 1;

        let adapter = &mut *self.adapter;
        let indexer = self.indexer;
        let check_exists = self.check_exists;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            adapter.index_document(&id, check_exists, indexer)
        }))
        .unwrap_or_else(|_| Err(QuarryError::internal("document indexer panicked")));

        match outcome {
            Ok(()) => {
                if let Some(hash) = self.adapter.document_hash(&id) {
                    self.indexer.set_document_hash(&id, hash);
                }
                self.report.indexed += 1;
            }
            Err(e) => {
                log::warn!(
                    "index '{}': failed to index '{id}': {e}",
                    self.indexer.name()
                );
                self.report.failed.push((id.clone(), e.to_string()));
            }
        }

        let total = self.pending.len().max(1);
        let progress = self.position as f32 / total as f32;
        self.emit(id, progress, false);
    }

    fn start_merge(&mut self) {
        for id in &self.removed {
            self.indexer.remove_document_hash(id);
        }
        self.report.removed = self.removed.len();

        let evicted = (!self.evicted.is_empty()).then_some(self.evicted.as_slice());
        self.merge = Some(self.indexer.finish(evicted, self.persist.take()));
        self.emit("Merging".to_string(), 1.0, false);
    }

    fn complete(&mut self, outcome: Result<()>) -> Result<BuildReport> {
        self.done = true;
        self.merge = None;
        match outcome {
            Ok(()) => {}
            Err(QuarryError::Aborted) => self.report.aborted = true,
            Err(e) => {
                self.emit(format!("Build failed: {e}"), 1.0, true);
                return Err(e);
            }
        }

        self.report.entries = self.indexer.entry_count();
        let message = if self.report.aborted {
            "Aborted".to_string()
        } else {
            format!("Indexed {} documents", self.report.indexed)
        };
        self.emit(message, 1.0, true);
        log::debug!("index '{}': build finished: {:?}", self.indexer.name(), self.report);
        Ok(self.report.clone())
    }

    /// Advance the build by one document, or poll the merge.
    pub fn step(&mut self) -> Result<BuildStatus> {
        if self.done {
            return Ok(BuildStatus::Done(self.report.clone()));
        }

        if let Some(merge) = &self.merge {
            return match merge.try_wait() {
                Some(outcome) => self.complete(outcome).map(BuildStatus::Done),
                None => Ok(BuildStatus::Merging),
            };
        }

        if self.position < self.pending.len() && !self.indexer.is_abort_requested() {
            self.index_next();
            return Ok(BuildStatus::Running {
                processed: self.position,
                total: self.pending.len(),
            });
        }

        self.start_merge();
        Ok(BuildStatus::Merging)
    }

    /// Pump [`step`](Self::step) until the build is done.
    pub fn run(mut self) -> Result<BuildReport> {
        loop {
            match self.step()? {
                BuildStatus::Done(report) => return Ok(report),
                BuildStatus::Merging => std::thread::sleep(Duration::from_millis(1)),
                BuildStatus::Running { .. } => {}
            }
        }
    }
}
