//! Rebuilding the metadata index from stored zipballs.

use super::HostedRepository;
use repertoire_core::{AssetKind, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of a rebuild run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Zipballs indexed.
    pub processed: usize,
    /// Zipballs without usable format attributes.
    pub skipped: usize,
    /// Whether the run stopped early.
    pub cancelled: bool,
}

/// Re-index every zipball of `repository`.
///
/// With `full` the index is cleared first, dropping entries whose zipball is
/// gone. Cancellation is checked before each asset; entries written before
/// cancellation stay.
///
/// # Errors
/// Returns error if the store cannot be browsed.
pub fn rebuild_metadata(
    repository: &HostedRepository,
    full: bool,
    cancel: &CancellationToken,
) -> Result<RebuildSummary> {
    info!(repository = repository.name(), full, "rebuilding composer metadata");

    if full {
        repository.index().remove_all();
    }

    let mut summary = RebuildSummary::default();
    for record in repository.store().browse(AssetKind::Zipball)? {
        if cancel.is_cancelled() {
            warn!(repository = repository.name(), "metadata rebuild cancelled");
            summary.cancelled = true;
            break;
        }
        match repository.index_asset(&record) {
            Ok(true) => summary.processed += 1,
            Ok(false) => summary.skipped += 1,
            Err(e) => {
                warn!(path = %record.path, error = %e, "failed to index asset");
                summary.skipped += 1;
            }
        }
    }

    info!(
        repository = repository.name(),
        processed = summary.processed,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        "metadata rebuild finished"
    );
    Ok(summary)
}
