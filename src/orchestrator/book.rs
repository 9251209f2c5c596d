//! Per-book pipeline.

use futures::future::join_all;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{BookStage, Orchestrator};
use crate::events::Event;
use crate::matching::identity::infer_identity;
use crate::matching::rank_metadata_results;
use crate::metadata::{TagCodec, TagRecord};
use crate::model::{
    BookGroup, BookOutcome, BookStatus, InferredIdentity, MatchResult, MetadataCandidate,
};
use crate::organizer::{
    OrganizeError, TransferMode, TransferOutcome, UndoJournal, check_destinations, transfer_file,
};
use crate::provider::{ProviderError, SearchQuery};
use crate::queue::{QueueCancelled, retry};

/// Why a single book failed.
#[derive(Debug, thiserror::Error)]
pub(super) enum BookError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Organize(#[from] OrganizeError),

    #[error(transparent)]
    Cancelled(#[from] QueueCancelled),

    #[error("Worker task failed: {0}")]
    Join(String),
}

impl Orchestrator {
    fn stage(&self, book: &BookGroup, stage: BookStage) {
        tracing::debug!(target: "orchestrator::book", book = %book.name, ?stage, "Stage");
        self.events.emit(Event::BookStage {
            book: book.name.clone(),
            stage,
        });
    }

    /// Identity from file names, refined by the first file's tags when a
    /// codec is configured.
    pub(super) async fn infer_identity(&self, book: &BookGroup) -> InferredIdentity {
        let tags = match &self.tags {
            Some(codec) if self.config.matching.use_tags => read_tags(codec, book).await,
            _ => None,
        };
        infer_identity(book, tags.as_ref())
    }

    async fn lookup_by_identifier(&self, id: &str) -> Result<MetadataCandidate, ProviderError> {
        let provider = &self.provider;
        let queue = &self.provider_queue;
        retry(&self.retry_policy, ProviderError::is_transient, move || {
            queue.add(provider.lookup_by_identifier(id))
        })
        .await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataCandidate>, ProviderError> {
        let provider = &self.provider;
        let queue = &self.provider_queue;
        retry(&self.retry_policy, ProviderError::is_transient, move || {
            queue.add(provider.search(query))
        })
        .await
    }

    /// Ranked candidates for `book`, best first.
    ///
    /// A hit on the book's identifier is exact and scores 1. An unknown
    /// identifier falls through to a free-text search.
    pub(super) async fn find_matches(
        &self,
        book: &BookGroup,
        identity: &InferredIdentity,
    ) -> Result<Vec<MatchResult>, BookError> {
        self.stage(book, BookStage::LookingUp);

        if let Some(ref asin) = identity.asin {
            match self.lookup_by_identifier(asin).await {
                Ok(candidate) => {
                    tracing::debug!(target: "orchestrator::book", book = %book.name, %asin, "Identifier match");
                    self.stage(book, BookStage::Scoring);
                    return Ok(vec![MatchResult {
                        candidate,
                        score: 1.0,
                    }]);
                }
                Err(ProviderError::NotFound) => {
                    tracing::debug!(target: "orchestrator::book", book = %book.name, %asin, "Identifier unknown, searching");
                }
                Err(e) => return Err(e.into()),
            }
            if identity.title.trim().is_empty() {
                self.stage(book, BookStage::Scoring);
                return Ok(Vec::new());
            }
        }

        let query = SearchQuery::new(identity.title.clone())
            .with_author(identity.author.clone())
            .with_narrator(identity.narrator.clone());
        let candidates = match self.search(&query).await {
            Ok(candidates) => candidates,
            Err(ProviderError::NotFound) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        self.emit_queue_status(&self.provider_queue);

        self.stage(book, BookStage::Scoring);
        Ok(rank_metadata_results(identity, candidates))
    }

    /// Run one book to a terminal status. Never fails; failures become a
    /// `failed` outcome.
    pub(super) async fn process_book(
        &self,
        book: &BookGroup,
        destination: &Path,
        journal: &Mutex<UndoJournal>,
    ) -> BookOutcome {
        let outcome = match self.organize_book(book, destination, journal).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(target: "orchestrator::book", book = %book.name, error = %e, "Book failed");
                BookOutcome::failed(book, e.to_string())
            }
        };

        self.events.emit(Event::BookCompleted {
            book: book.name.clone(),
            status: outcome.status,
            error: outcome.error.clone(),
        });
        outcome
    }

    async fn organize_book(
        &self,
        book: &BookGroup,
        destination: &Path,
        journal: &Mutex<UndoJournal>,
    ) -> Result<BookOutcome, BookError> {
        let identity = self.infer_identity(book).await;
        if identity.is_empty() {
            return Ok(BookOutcome {
                error: Some("no usable identity".to_string()),
                ..BookOutcome::new(book, BookStatus::Skipped)
            });
        }

        let matches = self.find_matches(book, &identity).await?;
        let best_score = matches.first().map(|m| m.score);
        let accepted = matches
            .into_iter()
            .next()
            .filter(|m| m.score >= self.config.matching.min_confidence);

        let has_title = !identity.title.trim().is_empty();
        let (candidate, status) = match accepted {
            Some(m) => (m.candidate, BookStatus::Processed),
            // Without a title there is nothing to lay out a path from.
            None if self.config.organize.organize_unmatched && has_title => {
                (MetadataCandidate::from_identity(&identity), BookStatus::MetadataOnly)
            }
            None => {
                tracing::info!(target: "orchestrator::book", book = %book.name, ?best_score, "No confident match, leaving in place");
                return Ok(BookOutcome {
                    score: best_score,
                    ..BookOutcome::new(book, BookStatus::MetadataOnly)
                });
            }
        };

        self.stage(book, BookStage::Organizing);
        let sources: Vec<PathBuf> = book.files.iter().map(|f| f.path.clone()).collect();
        let targets = self.engine.organize_multiple_files(
            &candidate,
            &sources,
            destination,
            self.template_override.clone(),
        )?;
        check_destinations(&sources, &targets)?;

        let results = self.transfer_all(&sources, &targets).await;
        self.emit_queue_status(&self.file_queue);

        let mut all_skipped = true;
        let mut first_error = None;
        let mut transferred = Vec::new();
        for ((source, target), result) in sources.iter().zip(&targets).zip(results) {
            match result {
                Ok(TransferOutcome::Skipped) => {}
                Ok(TransferOutcome::Moved) => {
                    all_skipped = false;
                    journal.lock().record(source, target, &book.name);
                    transferred.push(target.clone());
                }
                Ok(TransferOutcome::Copied) => {
                    all_skipped = false;
                    transferred.push(target.clone());
                }
                Ok(TransferOutcome::Planned) => all_skipped = false,
                Err(e) => {
                    all_skipped = false;
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            if transferred.is_empty() {
                return Err(e);
            }
            // Moved files stay journaled for undo; report where they went.
            tracing::warn!(
                target: "orchestrator::book",
                book = %book.name,
                transferred = transferred.len(),
                error = %e,
                "Book partially transferred"
            );
            return Ok(BookOutcome {
                metadata: Some(candidate),
                score: best_score,
                destinations: transferred,
                ..BookOutcome::failed(book, e.to_string())
            });
        }

        let status = if all_skipped { BookStatus::Skipped } else { status };
        if status == BookStatus::Processed
            && self.config.organize.write_tags
            && self.config.organize.mode != TransferMode::DryRun
        {
            self.write_tags(book, &candidate, &targets).await;
        }

        tracing::info!(target: "orchestrator::book", book = %book.name, %status, files = targets.len(), "Book organized");
        Ok(BookOutcome {
            metadata: Some(candidate),
            score: best_score,
            destinations: targets,
            ..BookOutcome::new(book, status)
        })
    }

    async fn transfer_all(
        &self,
        sources: &[PathBuf],
        targets: &[PathBuf],
    ) -> Vec<Result<TransferOutcome, BookError>> {
        let mode = self.config.organize.mode;
        join_all(sources.iter().zip(targets).map(|(source, target)| {
            let source = source.clone();
            let target = target.clone();
            self.file_queue.add(async move {
                tokio::task::spawn_blocking(move || transfer_file(&source, &target, mode))
                    .await
                    .map_err(|e| BookError::Join(e.to_string()))?
                    .map_err(BookError::from)
            })
        }))
        .await
    }

    /// Tag each transferred file. Failures are logged and never fail the book.
    async fn write_tags(
        &self,
        book: &BookGroup,
        candidate: &MetadataCandidate,
        targets: &[PathBuf],
    ) {
        let Some(codec) = &self.tags else {
            return;
        };
        let is_multi_file = targets.len() > 1;

        for (i, target) in targets.iter().enumerate() {
            let part = is_multi_file.then_some(i as u32 + 1);
            let record = TagRecord::from_candidate(candidate, part);
            let codec = Arc::clone(codec);
            let path = target.clone();
            match tokio::task::spawn_blocking(move || codec.write(&path, &record)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(target: "orchestrator::book", book = %book.name, error = %e, "Tag write failed");
                }
                Err(e) => {
                    tracing::warn!(target: "orchestrator::book", book = %book.name, error = %e, "Tag write task failed");
                }
            }
        }
    }
}

async fn read_tags(codec: &Arc<dyn TagCodec>, book: &BookGroup) -> Option<TagRecord> {
    let path = book.files.first()?.path.clone();
    let codec = Arc::clone(codec);
    match tokio::task::spawn_blocking(move || codec.read(&path)).await {
        Ok(Ok(tags)) => Some(tags),
        Ok(Err(e)) => {
            tracing::debug!(target: "orchestrator::book", book = %book.name, error = %e, "No usable tags");
            None
        }
        Err(e) => {
            tracing::warn!(target: "orchestrator::book", book = %book.name, error = %e, "Tag read task failed");
            None
        }
    }
}
