//! Column inference for BOM spreadsheets.
//!
//! BOM exports rarely share a layout: the header may sit below a title
//! block, and the description and part-number columns carry arbitrary
//! names. Instead of configuration, the layout is inferred by scoring a
//! handful of data rows: part numbers look like long alphanumeric codes,
//! descriptions look like prose. Header text only breaks ties.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use bomenrich_shared::{BomError, ColumnMap, Result};

/// How many leading rows are scanned when locating the header.
pub const HEADER_SCAN_ROWS: usize = 10;

/// Shape of a typical part number: letters, digits, and hyphens only.
static PART_NUMBER_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Header detection
// ---------------------------------------------------------------------------

/// Find the header row: the first of the leading rows containing any
/// alphabetic cell content.
///
/// Titles and blank spacer rows above the real header are numeric or empty
/// in practice, so the first alphabetic row is the column header.
pub fn find_header_row(rows: &[Vec<String>]) -> Result<usize> {
    for (index, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let has_alphabetic = row
            .iter()
            .any(|cell| cell.chars().any(|c| c.is_alphabetic()));
        if has_alphabetic {
            return Ok(index);
        }
    }
    Err(BomError::column_inference(
        format!("no header row found in the first {HEADER_SCAN_ROWS} rows"),
        rows.first().cloned().unwrap_or_default(),
    ))
}

// ---------------------------------------------------------------------------
// Column scoring
// ---------------------------------------------------------------------------

/// A part-number cell is a hyphenated alphanumeric code longer than five
/// characters. Short codes (quantities, reference designators) miss the
/// length cut.
fn looks_like_part_number(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.len() > 5 && PART_NUMBER_SHAPE_RE.is_match(trimmed)
}

/// A description cell reads like prose: starts with a letter and has at
/// least one internal space.
fn looks_like_description(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.chars().next().is_some_and(|c| c.is_alphabetic()) && trimmed.contains(' ')
}

/// Count, per column, how many sample cells satisfy the predicate.
fn score_columns(samples: &[Vec<String>], width: usize, matches: fn(&str) -> bool) -> Vec<usize> {
    let mut scores = vec![0usize; width];
    for row in samples {
        for (col, cell) in row.iter().take(width).enumerate() {
            if matches(cell) {
                scores[col] += 1;
            }
        }
    }
    scores
}

/// Pick the column with the highest score. Ties go to a column whose
/// header contains `keyword`; a zero maximum means no column qualified.
fn pick_column(scores: &[usize], header: &[String], keyword: &str) -> Option<usize> {
    let max = *scores.iter().max()?;
    if max == 0 {
        return None;
    }
    let candidates: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score == max)
        .map(|(col, _)| col)
        .collect();

    candidates
        .iter()
        .copied()
        .find(|&col| {
            header
                .get(col)
                .is_some_and(|h| h.to_lowercase().contains(keyword))
        })
        .or_else(|| candidates.first().copied())
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

/// Infer the description and part-number columns from up to five sampled
/// data rows.
///
/// Returns `(description_col, part_number_col)`, zero-based. Fails when
/// either shape never appears in the samples or both land on the same
/// column, carrying the header texts so the caller can show what the
/// sheet actually looked like.
#[instrument(skip_all, fields(columns = header.len(), samples = samples.len()))]
pub fn infer_columns(header: &[String], samples: &[Vec<String>]) -> Result<(usize, usize)> {
    let width = header
        .len()
        .max(samples.iter().map(|row| row.len()).max().unwrap_or(0));
    if width == 0 {
        return Err(BomError::column_inference(
            "header row is empty",
            header.to_vec(),
        ));
    }

    let part_scores = score_columns(samples, width, looks_like_part_number);
    let description_scores = score_columns(samples, width, looks_like_description);

    let part_number_col = pick_column(&part_scores, header, "part").ok_or_else(|| {
        BomError::column_inference(
            "no column matched the part-number shape in the sampled rows",
            header.to_vec(),
        )
    })?;
    let description_col = pick_column(&description_scores, header, "description").ok_or_else(
        || {
            BomError::column_inference(
                "no column matched the description shape in the sampled rows",
                header.to_vec(),
            )
        },
    )?;

    if description_col == part_number_col {
        return Err(BomError::column_inference(
            format!(
                "description and part number both resolved to column {}",
                description_col + 1
            ),
            header.to_vec(),
        ));
    }

    debug!(description_col, part_number_col, "columns inferred");
    Ok((description_col, part_number_col))
}

/// Locate the header row and infer the column layout in one step.
///
/// Samples up to `sample_rows` rows immediately below the header. The
/// returned [`ColumnMap`] is computed once per job and never revised; a
/// mid-job re-inference could disagree with rows already written.
pub fn infer_layout(rows: &[Vec<String>], sample_rows: usize) -> Result<ColumnMap> {
    let header_row = find_header_row(rows)?;
    let first_data = header_row + 1;
    let sample_end = rows.len().min(first_data + sample_rows);
    let samples = &rows[first_data..sample_end];

    let (description_col, part_number_col) = infer_columns(&rows[header_row], samples)?;

    Ok(ColumnMap {
        header_row,
        description_col,
        part_number_col,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
