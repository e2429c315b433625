//! Row streams for uploaded tabular files
//!
//! One capability, two strategies: produce ordered, row-numbered mappings
//! from either a delimited-text or spreadsheet source, tolerating malformed
//! individual rows without aborting the read. Row numbers match what a user
//! sees in the source file: the header is row 1, the first data row is row 2.
//!
//! The delimited strategy streams the file; the spreadsheet strategy
//! materializes the first sheet fully (a deliberate memory trade-off, since
//! the workbook formats cannot be decoded incrementally).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;

use veritag_common::types::{ErrorCode, FileKind, RowError};

use super::{IngestError, Result};

/// One parsed data row: header names plus cell values, in source order.
#[derive(Debug, Clone)]
pub struct RowRecord {
    /// Row number as visible in the source file (header is row 1)
    pub row: u64,
    headers: Arc<Vec<String>>,
    values: Vec<String>,
}

impl RowRecord {
    pub fn new(row: u64, headers: Arc<Vec<String>>, values: Vec<String>) -> Self {
        Self {
            row,
            headers,
            values,
        }
    }

    /// Value under the given column header, if that column exists.
    ///
    /// Short rows yield empty strings for their missing trailing columns.
    pub fn get(&self, key: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == key)?;
        Some(self.values.get(idx).map(String::as_str).unwrap_or(""))
    }

    /// Value of the first column, the extraction fallback.
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// Outcome of reading one row from a stream
#[derive(Debug)]
pub enum ParsedRow {
    Row(RowRecord),
    /// The row could not be decoded; the stream continues past it.
    Malformed(RowError),
}

/// Ordered source of row records, format-agnostic for downstream stages.
#[async_trait]
pub trait RowStream: Send {
    /// Next row in source order, or `None` once the input is exhausted.
    async fn next_row(&mut self) -> Result<Option<ParsedRow>>;

    /// Total data row count, when the format knows it up front.
    fn total_rows(&self) -> Option<u64> {
        None
    }
}

/// Open a row stream for the given file kind.
pub async fn open_row_stream(path: &Path, kind: FileKind) -> Result<Box<dyn RowStream>> {
    match kind {
        FileKind::Delimited => Ok(Box::new(DelimitedRows::open(path).await?)),
        FileKind::Spreadsheet => Ok(Box::new(SpreadsheetRows::open(path).await?)),
    }
}

// ============================================================================
// Delimited text (CSV)
// ============================================================================

/// Streaming reader for delimited text files.
///
/// The first row supplies column headers. Rows with inconsistent column
/// counts are tolerated; rows that fail to decode are reported as malformed
/// and skipped.
pub struct DelimitedRows {
    records: csv_async::StringRecordsIntoStream<'static, File>,
    headers: Arc<Vec<String>>,
    next_row: u64,
}

impl DelimitedRows {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        let mut reader = csv_async::AsyncReaderBuilder::new()
            .flexible(true)
            .create_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .await
            .map_err(|e| IngestError::Parse(format!("failed to read header row: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        Ok(Self {
            records: reader.into_records(),
            headers: Arc::new(headers),
            next_row: 2,
        })
    }
}

#[async_trait]
impl RowStream for DelimitedRows {
    async fn next_row(&mut self) -> Result<Option<ParsedRow>> {
        let Some(record) = self.records.next().await else {
            return Ok(None);
        };

        // The reader silently skips blank lines, so a yield count would
        // drift below the visible file rows. Trust its line tracking and
        // keep our own count only as a fallback.
        match record {
            Ok(record) => {
                let row = record
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(self.next_row);
                self.next_row = row + 1;

                let values = record.iter().map(|v| v.to_string()).collect();
                Ok(Some(ParsedRow::Row(RowRecord::new(
                    row,
                    Arc::clone(&self.headers),
                    values,
                ))))
            },
            Err(e) => {
                let row = e.position().map(|p| p.line()).unwrap_or(self.next_row);
                self.next_row = row + 1;

                Ok(Some(ParsedRow::Malformed(RowError::new(
                    row,
                    ErrorCode::ParseError,
                    format!("malformed row: {}", e),
                ))))
            },
        }
    }
}

// ============================================================================
// Spreadsheet (xlsx / xls / ods)
// ============================================================================

/// Materialized reader for spreadsheet workbooks.
///
/// Reads only the first sheet. Data row `i` (0-based) is reported as row
/// `i + 2` so reported numbers match the visible sheet rows.
pub struct SpreadsheetRows {
    headers: Arc<Vec<String>>,
    rows: std::vec::IntoIter<Vec<String>>,
    total: u64,
    next_row: u64,
}

impl SpreadsheetRows {
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let rows = tokio::task::spawn_blocking(move || read_first_sheet(&path))
            .await
            .map_err(|e| IngestError::Parse(format!("spreadsheet read task failed: {}", e)))??;

        Ok(Self::from_rows(rows))
    }

    /// Build from already-decoded rows; the first row supplies headers.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        let headers = if rows.is_empty() {
            Vec::new()
        } else {
            rows.remove(0)
                .into_iter()
                .map(|h| h.trim().to_string())
                .collect()
        };

        let total = rows.len() as u64;
        Self {
            headers: Arc::new(headers),
            rows: rows.into_iter(),
            total,
            next_row: 2,
        }
    }
}

#[async_trait]
impl RowStream for SpreadsheetRows {
    async fn next_row(&mut self) -> Result<Option<ParsedRow>> {
        let Some(values) = self.rows.next() else {
            return Ok(None);
        };

        let row = self.next_row;
        self.next_row += 1;

        Ok(Some(ParsedRow::Row(RowRecord::new(
            row,
            Arc::clone(&self.headers),
            values,
        ))))
    }

    fn total_rows(&self) -> Option<u64> {
        Some(self.total)
    }
}

/// Decode the first sheet of a workbook into string rows.
fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| IngestError::Parse(format!("failed to open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::Parse("workbook has no sheets".to_string()))?
        .map_err(|e| IngestError::Parse(format!("failed to read first sheet: {}", e)))?;

    let rows = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    Data::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect();

    Ok(rows)
}
