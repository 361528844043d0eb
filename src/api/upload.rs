use axum::{
    Json,
    extract::{Multipart, State},
};

use crate::AppState;
use crate::error::{ResolverError, Result};
use crate::ingest::{self, ColumnOverrides, IngestReport, Table, TableFormat};

struct UploadedFile {
    name: String,
    content_type: Option<String>,
    bytes: axum::body::Bytes,
}

/// POST /api/upload - Import historical tickets from a CSV or Excel file.
///
/// Form fields: `file` (required), `issue_column` and `resolution_column`
/// (optional header names overriding detection).
pub async fn upload_tickets(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>> {
    let mut file: Option<UploadedFile> = None;
    let mut overrides = ColumnOverrides::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ResolverError::InvalidInput(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ResolverError::InvalidInput(e.body_text()))?;
                file = Some(UploadedFile {
                    name: file_name,
                    content_type,
                    bytes,
                });
            }
            "issue_column" | "resolution_column" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ResolverError::InvalidInput(e.body_text()))?;
                let value = Some(value).filter(|v| !v.trim().is_empty());
                if name == "issue_column" {
                    overrides.issue = value;
                } else {
                    overrides.resolution = value;
                }
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ResolverError::InvalidInput("No file part".to_string()))?;
    if file.name.is_empty() {
        return Err(ResolverError::InvalidInput("No selected file".to_string()));
    }

    let format = TableFormat::detect(&file.name, file.content_type.as_deref())?;
    let table = Table::parse(&file.bytes, format)?;
    let report = ingest::ingest(&table, state.service.store(), &overrides)?;

    tracing::info!(
        file = %file.name,
        added = report.added,
        skipped = report.skipped,
        "Upload processed"
    );
    Ok(Json(report))
}
