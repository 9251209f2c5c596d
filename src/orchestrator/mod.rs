//! Batch pipeline: scan, group, identify and organize.
//!
//! ```text
//! Idle -> Scanning -> Grouping -> PerBookProcessing -> Completed
//!            \__________\______________\______________-> Failed
//! ```
//!
//! Only scan and setup failures move the batch to `Failed`. Each book runs
//! its own `LookingUp -> Scoring -> Organizing` pipeline and ends with a
//! status in the [`BatchResult`]; a failed book never aborts the batch.
//!
//! Provider calls go through a bounded [`TaskQueue`] wrapped in [`retry`];
//! file transfers go through a second queue.

mod book;

use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::events::{Event, EventSink};
use crate::library::group_files;
use crate::metadata::TagCodec;
use crate::model::{BatchResult, BookGroup, InferredIdentity, MatchResult};
use crate::organizer::{PathTemplate, PathTemplateEngine, TemplateSet, UndoJournal};
use crate::provider::MetadataProvider;
use crate::queue::{RetryPolicy, TaskQueue};
use crate::scanner::{DirectoryScanner, ScanOptions};

/// Batch-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Scanning,
    Grouping,
    PerBookProcessing,
    Completed,
    Failed,
}

/// Per-book pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStage {
    LookingUp,
    Scoring,
    Organizing,
}

/// Ranked candidates for one book, as reported by [`Orchestrator::identify`].
#[derive(Debug, Clone)]
pub struct BookIdentification {
    pub book: BookGroup,
    pub identity: InferredIdentity,
    pub matches: Vec<MatchResult>,
    pub error: Option<String>,
}

/// Drives a batch through the pipeline.
pub struct Orchestrator {
    config: Config,
    scanner: DirectoryScanner,
    provider: Arc<dyn MetadataProvider>,
    tags: Option<Arc<dyn TagCodec>>,
    engine: PathTemplateEngine,
    template_override: Option<PathTemplate>,
    provider_queue: TaskQueue,
    file_queue: TaskQueue,
    retry_policy: RetryPolicy,
    events: Arc<dyn EventSink>,
    state: Mutex<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn MetadataProvider>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            scanner: DirectoryScanner::new(Arc::clone(&events)),
            engine: PathTemplateEngine::new(TemplateSet::from_config(&config.organize.templates)),
            provider_queue: TaskQueue::new("provider", config.queue.provider_concurrency),
            file_queue: TaskQueue::new("files", config.queue.file_concurrency),
            retry_policy: config.queue.retry_policy(),
            template_override: None,
            tags: None,
            provider,
            events,
            config,
            state: Mutex::new(OrchestratorState::Idle),
        }
    }

    /// Read tags for identity inference and write them after transfer.
    pub fn with_tag_codec(mut self, codec: Arc<dyn TagCodec>) -> Self {
        self.tags = Some(codec);
        self
    }

    /// Use one template for every book instead of rule-based selection.
    pub fn with_template(mut self, template: Option<PathTemplate>) -> Self {
        self.template_override = template;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock()
    }

    fn set_state(&self, state: OrchestratorState) {
        *self.state.lock() = state;
        tracing::debug!(target: "orchestrator", ?state, "State changed");
        self.events.emit(Event::StateChanged { state });
    }

    fn emit_queue_status(&self, queue: &TaskQueue) {
        self.events.emit(Event::QueueStatus {
            queue: queue.name().to_string(),
            status: queue.status(),
        });
    }

    /// Scan `root` and group the files into books.
    pub async fn scan_books(&self, root: &Path) -> Result<Vec<BookGroup>, Error> {
        self.set_state(OrchestratorState::Scanning);
        let options = ScanOptions::from_config(&self.config.scan);
        let files = match self.scanner.scan(root, &options).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(target: "orchestrator", root = %root.display(), error = %e, "Scan failed");
                self.set_state(OrchestratorState::Failed);
                self.events.emit(Event::BatchFailed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        self.set_state(OrchestratorState::Grouping);
        let file_count = files.len();
        let books = group_files(files);
        self.events.emit(Event::BooksGrouped {
            books: books.len(),
            files: file_count,
        });
        tracing::info!(target: "orchestrator", books = books.len(), files = file_count, "Grouped library");
        Ok(books)
    }

    /// Run the full pipeline over `root`, organizing into `destination`.
    pub async fn run(&self, root: &Path, destination: &Path) -> Result<BatchResult, Error> {
        let books = self.scan_books(root).await?;

        self.set_state(OrchestratorState::PerBookProcessing);
        let journal = Mutex::new(UndoJournal::default());
        let outcomes = futures::future::join_all(
            books
                .iter()
                .map(|book| self.process_book(book, destination, &journal)),
        )
        .await;

        let mut batch = BatchResult::default();
        for outcome in outcomes {
            batch.record(outcome);
        }
        self.emit_queue_status(&self.provider_queue);
        self.emit_queue_status(&self.file_queue);

        let journal = journal.into_inner();
        if !journal.is_empty() {
            let path = self.config.organize.journal_path();
            if let Err(e) = journal.save(&path) {
                tracing::error!(target: "orchestrator", path = %path.display(), error = %e, "Failed to save undo journal");
            } else {
                tracing::info!(target: "orchestrator", path = %path.display(), moves = journal.moves.len(), "Saved undo journal");
            }
        }

        self.set_state(OrchestratorState::Completed);
        self.events.emit(Event::BatchCompleted {
            processed: batch.processed,
            metadata_only: batch.metadata_only,
            failed: batch.failed,
            skipped: batch.skipped,
        });
        tracing::info!(
            target: "orchestrator",
            processed = batch.processed,
            metadata_only = batch.metadata_only,
            failed = batch.failed,
            skipped = batch.skipped,
            "Batch complete"
        );
        Ok(batch)
    }

    /// Scan, group, look up and score without touching any file.
    pub async fn identify(&self, root: &Path) -> Result<Vec<BookIdentification>, Error> {
        let books = self.scan_books(root).await?;

        self.set_state(OrchestratorState::PerBookProcessing);
        let results = futures::future::join_all(books.into_iter().map(|book| async move {
            let identity = self.infer_identity(&book).await;
            match self.find_matches(&book, &identity).await {
                Ok(matches) => BookIdentification {
                    book,
                    identity,
                    matches,
                    error: None,
                },
                Err(e) => BookIdentification {
                    book,
                    identity,
                    matches: Vec::new(),
                    error: Some(e.to_string()),
                },
            }
        }))
        .await;

        self.set_state(OrchestratorState::Completed);
        Ok(results)
    }
}
