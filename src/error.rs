//! Batch-level errors.
//!
//! Library modules use specific error types via `thiserror`, while the CLI
//! uses `anyhow` for convenient error propagation.
//!
//! Per-book failures never surface here; they are recorded in the batch
//! result as [`BookOutcome`](crate::model::BookOutcome)s. The only thing that
//! stops a whole batch is a scan root that cannot be read.

use crate::scanner::ScanError;

/// Error returned by [`Orchestrator`](crate::orchestrator::Orchestrator)
/// entry points.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Directory scan failed
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
}
