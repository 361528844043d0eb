//! Tabular upload parsing (CSV and Excel workbooks).

use std::io::Cursor;

use calamine::{Reader, open_workbook_auto_from_rs};

use super::IngestError;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    /// `.xlsx` / `.xls`; the first worksheet is read.
    Excel,
}

impl TableFormat {
    /// Pick a format from the file name, falling back to the declared
    /// content type.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Result<Self, IngestError> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".csv") {
            return Ok(Self::Csv);
        }
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            return Ok(Self::Excel);
        }

        let guessed = mime_guess::from_path(&lower).first_raw();
        match content_type.or(guessed) {
            Some("text/csv" | "application/csv") => Ok(Self::Csv),
            Some(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                | "application/vnd.ms-excel",
            ) => Ok(Self::Excel),
            _ => Err(IngestError::UnsupportedFormat(filename.to_string())),
        }
    }
}

/// A header row plus data rows, all cells as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows that could not be decoded (e.g. invalid UTF-8 in a CSV record).
    pub unreadable_rows: usize,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            unreadable_rows: 0,
        }
    }

    pub fn parse(bytes: &[u8], format: TableFormat) -> Result<Self, IngestError> {
        match format {
            TableFormat::Csv => Self::from_csv(bytes),
            TableFormat::Excel => Self::from_excel(bytes),
        }
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| IngestError::Parse(e.to_string()))?
            .iter()
            .map(clean_header)
            .collect::<Vec<_>>();
        if headers.iter().all(String::is_empty) {
            return Err(IngestError::Parse("missing header row".to_string()));
        }

        let mut table = Self::new(headers, Vec::new());
        for record in reader.records() {
            match record {
                Ok(record) => table.rows.push(record.iter().map(str::to_string).collect()),
                Err(e) => {
                    tracing::warn!(name: "ingest.row_skipped", error = %e, "Unreadable CSV row");
                    table.unreadable_rows += 1;
                }
            }
        }
        Ok(table)
    }

    pub fn from_excel(bytes: &[u8]) -> Result<Self, IngestError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| IngestError::Parse(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| IngestError::Parse("workbook has no worksheets".to_string()))?
            .map_err(|e| IngestError::Parse(e.to_string()))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .ok_or_else(|| IngestError::Parse("missing header row".to_string()))?
            .iter()
            .map(|cell| clean_header(&cell.to_string()))
            .collect();

        let rows = rows
            .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
            .collect();

        Ok(Self::new(headers, rows))
    }

    /// Cell text at `column`, empty when the row is short.
    pub fn cell<'a>(row: &'a [String], column: usize) -> &'a str {
        row.get(column).map_or("", |s| s.trim())
    }
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}
