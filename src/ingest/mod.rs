//! Bulk import of historical ticket/resolution pairs.
//!
//! An upload is parsed into a [`Table`], its issue and resolution columns
//! are located ([`ColumnMapping`]), and every usable row becomes an
//! imported, already-resolved [`Ticket`]. Rows are independent: a bad row
//! is counted and skipped, it never aborts the batch. Embeddings are not
//! computed here; the resolution service fills them in lazily.

mod columns;
mod table;

pub use columns::{ColumnMapping, ColumnOverrides, ISSUE_ALIASES, RESOLUTION_ALIASES};
pub use table::{Table, TableFormat};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::tickets::{Priority, Ticket, TicketStore};

/// Errors that reject a whole upload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    /// No header matched the named alias set.
    #[error("Column not found: no header matches the {0} aliases")]
    ColumnNotFound(&'static str),

    #[error("Unsupported file format: {0} (use CSV or Excel)")]
    UnsupportedFormat(String),

    #[error("Could not parse upload: {0}")]
    Parse(String),
}

/// Outcome counts for one upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub added: usize,
    /// Rows with an empty issue or resolution, or that could not be read.
    pub skipped: usize,
    /// Rows whose issue text was already imported.
    pub duplicates: usize,
}

/// Import every usable row of `table` into `store`.
///
/// Column detection runs before any row is touched, so a
/// [`IngestError::ColumnNotFound`] leaves the store unchanged.
pub fn ingest(
    table: &Table,
    store: &TicketStore,
    overrides: &ColumnOverrides,
) -> Result<IngestReport, IngestError> {
    let mapping = ColumnMapping::detect(&table.headers, overrides)?;
    info!(
        issue_column = %table.headers[mapping.issue],
        resolution_column = %table.headers[mapping.resolution],
        rows = table.rows.len(),
        "Detected ingestion columns"
    );

    let mut report = IngestReport {
        skipped: table.unreadable_rows,
        ..IngestReport::default()
    };
    let mut candidates = Vec::with_capacity(table.rows.len());

    for (line, row) in table.rows.iter().enumerate() {
        let issue = Table::cell(row, mapping.issue);
        let resolution = Table::cell(row, mapping.resolution);

        if issue.is_empty() || resolution.is_empty() {
            tracing::debug!(name: "ingest.row_skipped", row = line + 1, "Empty issue or resolution");
            report.skipped += 1;
            continue;
        }

        let priority = mapping
            .priority
            .and_then(|col| Table::cell(row, col).parse::<Priority>().ok())
            .unwrap_or_default();
        candidates.push(Ticket::imported(issue, resolution, priority));
    }

    (report.added, report.duplicates) = store.add_historical_batch(candidates);

    info!(
        name: "ingest.completed",
        added = report.added,
        skipped = report.skipped,
        duplicates = report.duplicates,
        "Ingestion completed"
    );
    Ok(report)
}
