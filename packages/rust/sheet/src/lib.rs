//! Spreadsheet decoding and encoding for BOM files.
//!
//! Reads `.xlsx`/`.xls` workbooks via `calamine` and `.csv` files via the
//! `csv` crate into a uniform string [`Grid`]. Everything downstream
//! (column inference, enrichment, checkpoints) works on the grid; output
//! artifacts are encoded back to CSV, which is the only format written.

use std::io::Cursor;
use std::path::Path;

use calamine::Reader;
use tracing::{debug, instrument};

use bomenrich_shared::{BomError, Result};

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// A spreadsheet as rows of string cells.
///
/// Rows may be ragged after decoding; [`Grid::set_cell`] pads with empty
/// cells so enrichment columns land at a consistent index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    /// Build a grid from decoded rows.
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// All rows, in sheet order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row. Enrichment columns are appended from here.
    pub fn width(&self) -> usize {
        self.rows.iter().map(|row| row.len()).max().unwrap_or(0)
    }

    /// Cell content, or `""` for cells outside the ragged row bounds.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Write a cell, padding the row (and the grid) with empty cells as
    /// needed to reach it.
    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.into();
    }
}

// ---------------------------------------------------------------------------
// Format detection
// ---------------------------------------------------------------------------

/// Supported input formats, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SheetFormat {
    /// Detect the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "xls" => Ok(Self::Xls),
            "csv" => Ok(Self::Csv),
            other => Err(BomError::sheet(format!(
                "unsupported file type {other:?} for {}; expected .xlsx, .xls, or .csv",
                path.display()
            ))),
        }
    }

    /// Canonical extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Csv => "csv",
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a spreadsheet file into a [`Grid`], dispatching on extension.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn decode_path(path: &Path) -> Result<Grid> {
    let format = SheetFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|e| BomError::io(path, e))?;
    decode_bytes(format, &bytes)
}

/// Decode raw file bytes in the given format.
///
/// Byte-level decoding keeps resume cheap: the original upload is held in
/// the job store and re-decoded without touching the source file again.
pub fn decode_bytes(format: SheetFormat, bytes: &[u8]) -> Result<Grid> {
    let grid = match format {
        SheetFormat::Xlsx | SheetFormat::Xls => decode_workbook(bytes)?,
        SheetFormat::Csv => decode_csv(bytes)?,
    };
    debug!(rows = grid.row_count(), width = grid.width(), "sheet decoded");
    Ok(grid)
}

/// Decode an Excel workbook, reading the first worksheet only.
fn decode_workbook(bytes: &[u8]) -> Result<Grid> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| BomError::sheet(format!("failed to open workbook: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| BomError::sheet("workbook has no worksheets"))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| BomError::sheet(format!("failed to read worksheet {sheet_name:?}: {e}")))?;

    let rows = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| cell.to_string().trim().to_string())
                .collect()
        })
        .collect();

    Ok(Grid::new(rows))
}

/// Decode CSV bytes. The first row is NOT treated as a header here; header
/// detection happens later against the full grid.
fn decode_csv(bytes: &[u8]) -> Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| BomError::sheet(format!("failed to parse CSV: {e}")))?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    Ok(Grid::new(rows))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a grid as CSV bytes, padding ragged rows to the grid width so
/// every record has the same number of fields.
pub fn encode_csv(grid: &Grid) -> Result<Vec<u8>> {
    let width = grid.width();
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    for row in grid.rows() {
        let mut record: Vec<&str> = row.iter().map(String::as_str).collect();
        record.resize(width, "");
        writer
            .write_record(&record)
            .map_err(|e| BomError::sheet(format!("failed to write CSV record: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| BomError::sheet(format!("failed to flush CSV: {e}")))
}

/// Encode a grid and write it to a file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn encode_csv_to_path(grid: &Grid, path: &Path) -> Result<()> {
    let bytes = encode_csv(grid)?;
    std::fs::write(path, bytes).map_err(|e| BomError::io(path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
