//! Core domain types for bomenrich jobs and rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the job metadata format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Cell text written when the formatting stage yields no primary source.
pub const NO_SOURCE: &str = "NO_SOURCE";

/// Cell text written when the formatting stage yields no secondary source.
pub const NO_SECOND_SOURCE: &str = "NO_SECOND_SOURCE";

/// Description sentinel for rows that carry no part number at all.
/// The canonicalizer passes it through untouched.
pub const NO_PART_NUMBER: &str = "NO PART NUMBER AVAILABLE";

/// Cell text written for rows skipped before any lookup.
pub const SKIPPED_ROW: &str = "Skipped: no part number or description";

/// Cell text written when the lookup produced an empty suggestion.
pub const NO_SUGGESTION: &str = "No suggestion";

/// Prefix for per-row failures recorded in the enriched column.
pub const ROW_ERROR_PREFIX: &str = "Error: ";

/// Header text for the appended canonical-description column.
pub const ENRICHED_DESCRIPTION_HEADER: &str = "Enriched Description";

/// Header text for the appended primary-source column.
pub const SOURCE_HEADER: &str = "Source";

/// Header text for the appended secondary-source column.
pub const SECOND_SOURCE_HEADER: &str = "Second Source";

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for enrichment job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ColumnMap
// ---------------------------------------------------------------------------

/// Where the interesting columns live in an input sheet.
///
/// Indices are zero-based internally; display formatting is one-based to
/// match what spreadsheet users expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    /// Row index of the detected header row.
    pub header_row: usize,
    /// Column index of the free-text description.
    pub description_col: usize,
    /// Column index of the manufacturer part number.
    pub part_number_col: usize,
}

impl std::fmt::Display for ColumnMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "header row {}, description col {}, part-number col {}",
            self.header_row + 1,
            self.description_col + 1,
            self.part_number_col + 1
        )
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One BOM row as handed to the enrichment orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRow {
    /// Zero-based row index in the sheet (header excluded from processing).
    pub index: usize,
    /// Free-text component description from the description column.
    pub description: String,
    /// Manufacturer part number from the part-number column.
    pub part_number: String,
}

/// The enrichment produced for a single row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowEnrichment {
    /// Canonicalized description destined for the enriched column.
    pub description: String,
    /// `https://` URL or [`NO_SOURCE`].
    pub primary_source: String,
    /// `https://` URL or [`NO_SECOND_SOURCE`].
    pub secondary_source: String,
    /// Raw search-stage text, kept for diagnostics.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_search: String,
}

// ---------------------------------------------------------------------------
// Job metadata
// ---------------------------------------------------------------------------

/// One collaborator exchange recorded against a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Who produced the content: `user`, `search`, or `format`.
    pub role: String,
    /// The exchanged text.
    pub content: String,
    /// When the exchange happened.
    pub at: DateTime<Utc>,
}

/// The per-job metadata record persisted under `jobs/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMeta {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Unique identifier for this job.
    pub id: JobId,
    /// Original upload/file name.
    pub original_name: String,
    /// SHA-256 of the input bytes.
    pub input_sha256: String,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last touched (read or written).
    pub last_access: DateTime<Utc>,
    /// Column layout computed at job start. Kept here so a resumed job
    /// never re-infers and diverges from rows already written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_map: Option<ColumnMap>,
    /// Collaborator interaction history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exchanges: Vec<ExchangeRecord>,
}

// ---------------------------------------------------------------------------
// Artifact kinds
// ---------------------------------------------------------------------------

/// Which flavor of artifact a persisted file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Mid-job snapshot written every N rows and on soft-abort/cancel.
    Checkpoint,
    /// Final enriched output.
    Enriched,
}

impl ArtifactKind {
    /// File-name segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::Enriched => "enriched",
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "checkpoint" => Ok(Self::Checkpoint),
            "enriched" => Ok(Self::Enriched),
            other => Err(format!("unknown artifact kind: {other}")),
        }
    }
}
