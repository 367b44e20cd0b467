//! End-to-end enrichment pipeline: decode → infer → enrich → persist.
//!
//! Rows within one job run strictly sequentially because the lookup
//! collaborators are rate limited; separate jobs can run concurrently
//! since nothing here is process-global. Checkpoints flush every
//! `checkpoint_every` rows and on soft-abort or cancellation, so a
//! partial run is always resumable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, instrument, warn};

use bomenrich_infer::infer_layout;
use bomenrich_lookup::RetryPolicy;
use bomenrich_sheet::{Grid, SheetFormat, decode_bytes, encode_csv};
use bomenrich_shared::{
    ArtifactKind, BomError, ColumnMap, ComponentRow, ENRICHED_DESCRIPTION_HEADER, EnrichConfig,
    JobId, ROW_ERROR_PREFIX, Result, SECOND_SOURCE_HEADER, SKIPPED_ROW, SOURCE_HEADER,
};
use bomenrich_store::JobStore;

use crate::orchestrator::{Collaborators, RowOutcome, enrich_row};

// ---------------------------------------------------------------------------
// Observer traits
// ---------------------------------------------------------------------------

/// Progress callbacks for reporting job status.
pub trait JobProgress: Send + Sync {
    /// Called when entering a new pipeline phase.
    fn phase(&self, name: &str);
    /// Called after every row, whatever its outcome.
    fn progress(&self, processed: usize, total: usize);
    /// Called after each successfully canonicalized row.
    fn preview(&self, before: &str, after: &str, primary_source: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl JobProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn progress(&self, _processed: usize, _total: usize) {}
    fn preview(&self, _before: &str, _after: &str, _primary_source: &str) {}
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Job-scoped cancellation flag, checked between rows.
///
/// Cancelling never loses work: the pipeline flushes a checkpoint before
/// returning the partial summary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the in-flight row still finishes.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// What a job produced, cumulative across the initial run and resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobSummary {
    /// Rows that received an enrichment.
    pub processed: usize,
    /// Rows skipped for a missing part number or description.
    pub skipped: usize,
    /// Rows recorded as row-level errors.
    pub failed: usize,
    /// Data rows in the sheet.
    pub total: usize,
    /// True when the job stopped early: rate limit, cancel, or row limit.
    pub partial: bool,
}

impl JobSummary {
    /// Rows with any recorded outcome.
    pub fn done(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

// ---------------------------------------------------------------------------
// Job entry points
// ---------------------------------------------------------------------------

/// Run an enrichment job end to end.
///
/// The job record must already exist (see [`JobStore::create_job`]).
///
/// 1. Decode the input bytes into a grid.
/// 2. Infer the column layout; failure is fatal and reports the header
///    texts seen.
/// 3. Append the three enrichment headers after the last populated
///    column.
/// 4. Enrich rows sequentially with periodic checkpoints.
/// 5. Persist the final artifact (fatal on failure) and update job
///    metadata.
#[instrument(skip_all, fields(job = %job_id, format = format.extension()))]
pub async fn run_job(
    job_id: JobId,
    format: SheetFormat,
    input: &[u8],
    config: &EnrichConfig,
    collab: &Collaborators<'_>,
    store: &JobStore,
    progress: &dyn JobProgress,
    cancel: &CancelFlag,
) -> Result<JobSummary> {
    progress.phase("Decoding input");
    let mut grid = decode_bytes(format, input)?;
    info!(rows = grid.row_count(), cols = grid.width(), "input decoded");

    progress.phase("Inferring columns");
    let map = infer_layout(grid.rows(), config.sample_rows)?;
    store.set_column_map(job_id, map)?;
    info!(%map, "column layout inferred");

    // The three enrichment columns go after the last populated column.
    let base_col = grid.width();
    grid.set_cell(map.header_row, base_col, ENRICHED_DESCRIPTION_HEADER);
    grid.set_cell(map.header_row, base_col + 1, SOURCE_HEADER);
    grid.set_cell(map.header_row, base_col + 2, SECOND_SOURCE_HEADER);

    progress.phase("Enriching rows");
    let summary = enrich_grid(
        job_id,
        &mut grid,
        map,
        base_col,
        JobSummary::default(),
        config,
        collab,
        store,
        progress,
        cancel,
    )
    .await?;

    finalize(job_id, &grid, summary, store, progress).await
}

/// Continue a job from its newest checkpoint.
///
/// The working-set buffer is preferred when still cached; otherwise the
/// newest checkpoint artifact is loaded. The column layout recorded at
/// job start is reused so resumed rows line up with rows already
/// written. Rows whose enriched cell is populated keep their values and
/// count toward the cumulative summary.
#[instrument(skip_all, fields(job = %job_id))]
pub async fn resume_job(
    job_id: JobId,
    config: &EnrichConfig,
    collab: &Collaborators<'_>,
    store: &JobStore,
    progress: &dyn JobProgress,
    cancel: &CancelFlag,
) -> Result<JobSummary> {
    let meta = store
        .job_meta(job_id)?
        .ok_or_else(|| BomError::validation(format!("unknown job {job_id}")))?;
    let map = meta.column_map.ok_or_else(|| {
        BomError::validation("job has no recorded column layout; run it from the start")
    })?;

    progress.phase("Loading checkpoint");
    let bytes = match store.get_working(job_id).await {
        Some(bytes) => {
            info!("resuming from working-set buffer");
            bytes
        }
        None => {
            let artifact = store
                .latest_artifact(job_id)?
                .ok_or_else(|| BomError::validation(format!("no checkpoint for job {job_id}")))?;
            if artifact.kind == ArtifactKind::Enriched {
                return Err(BomError::validation("job already has a final artifact"));
            }
            info!(path = %artifact.path.display(), "resuming from checkpoint artifact");
            artifact.bytes
        }
    };
    // Checkpoints are CSV regardless of the original input format.
    let mut grid = decode_bytes(SheetFormat::Csv, &bytes)?;

    let header = grid
        .rows()
        .get(map.header_row)
        .ok_or_else(|| BomError::validation("checkpoint grid has no header row"))?;
    // rposition: ours is the appended one even if the sheet already had
    // a column with the same header text.
    let base_col = header
        .iter()
        .rposition(|cell| cell == ENRICHED_DESCRIPTION_HEADER)
        .ok_or_else(|| BomError::validation("checkpoint is missing the enrichment headers"))?;

    let prior = prior_outcomes(&grid, map, base_col);
    info!(done = prior.done(), "resuming past settled rows");
    store.touch_job(job_id)?;

    progress.phase("Enriching rows");
    let summary = enrich_grid(
        job_id, &mut grid, map, base_col, prior, config, collab, store, progress, cancel,
    )
    .await?;

    finalize(job_id, &grid, summary, store, progress).await
}

// ---------------------------------------------------------------------------
// Row engine
// ---------------------------------------------------------------------------

/// Sequential row engine shared by run and resume.
#[allow(clippy::too_many_arguments)]
async fn enrich_grid(
    job_id: JobId,
    grid: &mut Grid,
    map: ColumnMap,
    base_col: usize,
    prior: JobSummary,
    config: &EnrichConfig,
    collab: &Collaborators<'_>,
    store: &JobStore,
    progress: &dyn JobProgress,
    cancel: &CancelFlag,
) -> Result<JobSummary> {
    let retry = RetryPolicy::new(
        config.retry_attempts,
        Duration::from_millis(config.retry_delay_ms),
    );
    let first_data_row = map.header_row + 1;
    let mut summary = JobSummary {
        total: grid.row_count().saturating_sub(first_data_row),
        partial: false,
        ..prior
    };
    let mut run_budget = config.row_limit;
    let mut since_checkpoint = 0usize;

    for row_index in first_data_row..grid.row_count() {
        if !grid.cell(row_index, base_col).is_empty() {
            continue; // settled on a previous run
        }
        if cancel.is_cancelled() {
            info!(row = row_index, "cancelled; flushing checkpoint");
            summary.partial = true;
            checkpoint(job_id, grid, store).await;
            return Ok(summary);
        }
        if run_budget == Some(0) {
            info!(row = row_index, "row limit reached; flushing checkpoint");
            summary.partial = true;
            checkpoint(job_id, grid, store).await;
            return Ok(summary);
        }

        let row = ComponentRow {
            index: row_index,
            description: grid.cell(row_index, map.description_col).to_string(),
            part_number: grid.cell(row_index, map.part_number_col).to_string(),
        };

        match enrich_row(&row, collab, &retry).await {
            Ok(RowOutcome::Enriched(enrichment)) => {
                grid.set_cell(row_index, base_col, enrichment.description.clone());
                grid.set_cell(row_index, base_col + 1, enrichment.primary_source.clone());
                grid.set_cell(row_index, base_col + 2, enrichment.secondary_source);
                record_exchange(store, job_id, "search", &enrichment.raw_search);
                progress.preview(
                    &row.description,
                    &enrichment.description,
                    &enrichment.primary_source,
                );
                summary.processed += 1;
            }
            Ok(RowOutcome::Skipped) => {
                grid.set_cell(row_index, base_col, SKIPPED_ROW);
                summary.skipped += 1;
            }
            Ok(RowOutcome::Failed { phase, reason }) => {
                warn!(
                    row = row_index,
                    phase = phase.as_str(),
                    reason,
                    "row error recorded"
                );
                grid.set_cell(row_index, base_col, format!("{ROW_ERROR_PREFIX}{reason}"));
                summary.failed += 1;
            }
            Err(error) if error.is_rate_limit() => {
                // The aborted row keeps an empty cell so a resume retries it.
                warn!(row = row_index, %error, "rate limited; soft-aborting job");
                summary.partial = true;
                checkpoint(job_id, grid, store).await;
                return Ok(summary);
            }
            Err(error) => return Err(error),
        }

        progress.progress(summary.done(), summary.total);
        if let Some(budget) = run_budget.as_mut() {
            *budget -= 1;
        }
        since_checkpoint += 1;
        if since_checkpoint >= config.checkpoint_every {
            checkpoint(job_id, grid, store).await;
            since_checkpoint = 0;
        }
    }

    Ok(summary)
}

/// Classify already-written enriched cells from a checkpoint grid.
fn prior_outcomes(grid: &Grid, map: ColumnMap, base_col: usize) -> JobSummary {
    let mut prior = JobSummary::default();
    for row_index in (map.header_row + 1)..grid.row_count() {
        let cell = grid.cell(row_index, base_col);
        if cell.is_empty() {
            continue;
        }
        if cell == SKIPPED_ROW {
            prior.skipped += 1;
        } else if cell.starts_with(ROW_ERROR_PREFIX) {
            prior.failed += 1;
        } else {
            prior.processed += 1;
        }
    }
    prior
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Encode the grid and flush it to the working set plus a checkpoint
/// artifact. Checkpoint writes are best effort: a failure is logged and
/// the job continues from the in-memory grid.
async fn checkpoint(job_id: JobId, grid: &Grid, store: &JobStore) {
    let bytes = match encode_csv(grid) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(%error, "checkpoint encode failed");
            return;
        }
    };
    store.put_working(job_id, bytes.clone()).await;
    if let Err(error) = store.save_artifact(job_id, ArtifactKind::Checkpoint, &bytes) {
        warn!(%error, "checkpoint write failed");
    }
}

/// Persist the final artifact for a complete run; for a partial run the
/// flushed checkpoint stays the newest artifact. The final persist is
/// the only fatal storage write.
async fn finalize(
    job_id: JobId,
    grid: &Grid,
    summary: JobSummary,
    store: &JobStore,
    progress: &dyn JobProgress,
) -> Result<JobSummary> {
    if summary.partial {
        if let Err(error) = store.touch_job(job_id) {
            warn!(%error, "failed to touch job metadata");
        }
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            total = summary.total,
            "job stopped early; checkpoint retained"
        );
        return Ok(summary);
    }

    progress.phase("Persisting artifact");
    let bytes = encode_csv(grid)?;
    store.save_artifact(job_id, ArtifactKind::Enriched, &bytes)?;
    store.remove_working(job_id).await;
    if let Err(error) = store.touch_job(job_id) {
        warn!(%error, "failed to touch job metadata");
    }
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        total = summary.total,
        "job complete"
    );
    Ok(summary)
}

/// Exchange recording is best effort; a metadata write failure never
/// fails the row.
fn record_exchange(store: &JobStore, job_id: JobId, role: &str, content: &str) {
    if let Err(error) = store.append_exchange(job_id, role, &truncate_exchange(content)) {
        warn!(%error, "failed to record exchange");
    }
}

const EXCHANGE_MAX_CHARS: usize = 2000;

/// Bound recorded exchange text so job metadata stays small.
fn truncate_exchange(text: &str) -> String {
    if text.chars().count() <= EXCHANGE_MAX_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCHANGE_MAX_CHARS).collect();
    format!("{cut}... [truncated]")
}
