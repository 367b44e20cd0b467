//! Per-row enrichment state machine.
//!
//! Each row moves `Pending → Searching → Formatting → Canonicalizing →
//! Done`. Rows with nothing to look up land in `Skipped`; a failure in
//! any in-flight state lands in `Failed` with the reason kept for the
//! output cell, so one bad row never aborts the job. The single failure
//! that escapes to the caller is a provider rate limit, which the
//! pipeline turns into a job-level soft abort.

use tracing::{debug, instrument, warn};

use bomenrich_canon::canonicalize;
use bomenrich_lookup::{PartLookup, ReplyFormat, RetryPolicy, with_retry};
use bomenrich_shared::{BomError, ComponentRow, NO_SUGGESTION, Result, RowEnrichment};

use crate::response::parse_reply;

/// The two text-generation collaborators a job talks to.
pub struct Collaborators<'a> {
    /// Search stage: raw findings for a part number.
    pub search: &'a dyn PartLookup,
    /// Format stage: compresses findings into the three-line reply.
    pub format: &'a dyn ReplyFormat,
}

/// States a row passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPhase {
    Pending,
    Searching,
    Formatting,
    Canonicalizing,
    Done,
    Skipped,
    Failed,
}

impl RowPhase {
    /// Short name for logging and recorded failure reasons.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::Formatting => "formatting",
            Self::Canonicalizing => "canonicalizing",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// What one row produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Search, formatting, and canonicalization all completed.
    Enriched(RowEnrichment),
    /// Nothing to look up: empty part number or description.
    Skipped,
    /// Row-level failure, recorded as cell text while the job continues.
    Failed { phase: RowPhase, reason: String },
}

/// Run one row through the state machine.
///
/// The search call retries transient failures under `retry`; the format
/// call is not retried. Any non-transient collaborator failure becomes
/// [`RowOutcome::Failed`]. Rate limits are the exception: they propagate
/// as errors so the caller can soft-abort the whole job.
#[instrument(skip_all, fields(row = row.index, part = %row.part_number))]
pub async fn enrich_row(
    row: &ComponentRow,
    collab: &Collaborators<'_>,
    retry: &RetryPolicy,
) -> Result<RowOutcome> {
    if row.part_number.trim().is_empty() || row.description.trim().is_empty() {
        debug!(phase = RowPhase::Skipped.as_str(), "nothing to look up");
        return Ok(RowOutcome::Skipped);
    }

    let mut phase = RowPhase::Searching;
    debug!(phase = phase.as_str(), "row phase");
    let raw_search = match with_retry(retry, || {
        collab.search.search(&row.description, &row.part_number)
    })
    .await
    {
        Ok(text) => text,
        Err(error) => return fail_or_abort(phase, error),
    };

    phase = RowPhase::Formatting;
    debug!(phase = phase.as_str(), "row phase");
    let reply = match collab
        .format
        .format(&raw_search, &row.description, &row.part_number)
        .await
    {
        Ok(text) => text,
        Err(error) => return fail_or_abort(phase, error),
    };
    let parsed = parse_reply(&reply);

    phase = RowPhase::Canonicalizing;
    debug!(phase = phase.as_str(), "row phase");
    let description = if parsed.description == NO_SUGGESTION {
        parsed.description
    } else {
        canonicalize(&parsed.description, &row.part_number)
    };

    debug!(phase = RowPhase::Done.as_str(), "row phase");
    Ok(RowOutcome::Enriched(RowEnrichment {
        description,
        primary_source: parsed.primary_source,
        secondary_source: parsed.secondary_source,
        raw_search,
    }))
}

/// Rate limits escape so the job can soft-abort; everything else is a
/// row-level failure.
fn fail_or_abort(phase: RowPhase, error: BomError) -> Result<RowOutcome> {
    if error.is_rate_limit() {
        return Err(error);
    }
    warn!(phase = phase.as_str(), %error, "row failed");
    Ok(RowOutcome::Failed {
        phase,
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bomenrich_shared::{NO_SECOND_SOURCE, NO_SOURCE};

    /// Fails the first `fail_first` calls with a transient error, then
    /// answers with fixed findings.
    struct FlakySearch {
        fail_first: u32,
        calls: AtomicU32,
    }

    impl FlakySearch {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PartLookup for FlakySearch {
        async fn search(&self, _description: &str, part_number: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(BomError::Transient("connection reset by peer".into()));
            }
            Ok(format!("distributor listing for {part_number}"))
        }
    }

    struct FixedFormat {
        reply: &'static str,
        calls: AtomicU32,
    }

    impl FixedFormat {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ReplyFormat for FixedFormat {
        async fn format(
            &self,
            _raw_text: &str,
            _description: &str,
            _part_number: &str,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    struct RateLimitedFormat;

    #[async_trait]
    impl ReplyFormat for RateLimitedFormat {
        async fn format(
            &self,
            _raw_text: &str,
            _description: &str,
            _part_number: &str,
        ) -> Result<String> {
            Err(BomError::RateLimited("credits exhausted".into()))
        }
    }

    fn sample_row() -> ComponentRow {
        ComponentRow {
            index: 1,
            description: "ATTEN CHIP DC-18GHz 3 DB".into(),
            part_number: "TS0503W3".into(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    const GOOD_REPLY: &str =
        "ATTEN DC-18GHz 3DB SMT\nhttps://example.com/atten\nNO_SECOND_SOURCE";

    #[tokio::test]
    async fn row_completes_through_all_phases() {
        let search = FlakySearch::new(0);
        let format = FixedFormat::new(GOOD_REPLY);
        let collab = Collaborators {
            search: &search,
            format: &format,
        };

        let outcome = enrich_row(&sample_row(), &collab, &fast_retry())
            .await
            .unwrap();
        match outcome {
            RowOutcome::Enriched(enrichment) => {
                assert_eq!(enrichment.description, "ATTEN DC-18GHz 3DB SMT");
                assert_eq!(enrichment.primary_source, "https://example.com/atten");
                assert_eq!(enrichment.secondary_source, NO_SECOND_SOURCE);
                assert_eq!(enrichment.raw_search, "distributor listing for TS0503W3");
            }
            other => panic!("expected enriched outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_search_failures_are_retried() {
        let search = FlakySearch::new(2);
        let format = FixedFormat::new(GOOD_REPLY);
        let collab = Collaborators {
            search: &search,
            format: &format,
        };

        let outcome = enrich_row(&sample_row(), &collab, &fast_retry())
            .await
            .unwrap();
        assert!(matches!(outcome, RowOutcome::Enriched(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_fails_the_row_not_the_job() {
        let search = FlakySearch::new(u32::MAX);
        let format = FixedFormat::new(GOOD_REPLY);
        let collab = Collaborators {
            search: &search,
            format: &format,
        };

        let outcome = enrich_row(&sample_row(), &collab, &fast_retry())
            .await
            .unwrap();
        match outcome {
            RowOutcome::Failed { phase, reason } => {
                assert_eq!(phase, RowPhase::Searching);
                assert!(reason.contains("transient"));
            }
            other => panic!("expected failed outcome, got {other:?}"),
        }
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
        assert_eq!(format.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rate_limit_escapes_as_an_error() {
        let search = FlakySearch::new(0);
        let collab = Collaborators {
            search: &search,
            format: &RateLimitedFormat,
        };

        let error = enrich_row(&sample_row(), &collab, &fast_retry())
            .await
            .unwrap_err();
        assert!(error.is_rate_limit());
    }

    #[tokio::test]
    async fn empty_part_number_skips_without_searching() {
        let search = FlakySearch::new(0);
        let format = FixedFormat::new(GOOD_REPLY);
        let collab = Collaborators {
            search: &search,
            format: &format,
        };
        let row = ComponentRow {
            index: 3,
            description: "CONN HEADER 2MM".into(),
            part_number: "  ".into(),
        };

        let outcome = enrich_row(&row, &collab, &fast_retry()).await.unwrap();
        assert_eq!(outcome, RowOutcome::Skipped);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_description_skips_without_searching() {
        let search = FlakySearch::new(0);
        let format = FixedFormat::new(GOOD_REPLY);
        let collab = Collaborators {
            search: &search,
            format: &format,
        };
        let row = ComponentRow {
            index: 4,
            description: String::new(),
            part_number: "TS0503W3".into(),
        };

        let outcome = enrich_row(&row, &collab, &fast_retry()).await.unwrap();
        assert_eq!(outcome, RowOutcome::Skipped);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_reply_degrades_instead_of_failing() {
        let search = FlakySearch::new(0);
        let format = FixedFormat::new("CAP CHIP CER 39 PF 50 V 2% COG");
        let collab = Collaborators {
            search: &search,
            format: &format,
        };

        let outcome = enrich_row(&sample_row(), &collab, &fast_retry())
            .await
            .unwrap();
        match outcome {
            RowOutcome::Enriched(enrichment) => {
                // The formatted line still runs through canonicalization.
                assert_eq!(enrichment.description, "CAP CER 39PF 50V 2% COG");
                assert_eq!(enrichment.primary_source, NO_SOURCE);
                assert_eq!(enrichment.secondary_source, NO_SECOND_SOURCE);
            }
            other => panic!("expected enriched outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_reply_records_no_suggestion() {
        let search = FlakySearch::new(0);
        let format = FixedFormat::new("\nhttps://example.com/found");
        let collab = Collaborators {
            search: &search,
            format: &format,
        };

        let outcome = enrich_row(&sample_row(), &collab, &fast_retry())
            .await
            .unwrap();
        match outcome {
            RowOutcome::Enriched(enrichment) => {
                assert_eq!(enrichment.description, NO_SUGGESTION);
                assert_eq!(enrichment.primary_source, "https://example.com/found");
            }
            other => panic!("expected enriched outcome, got {other:?}"),
        }
    }
}
