//! Error types for ticket resolution.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::IngestError;
use crate::matching::MatchError;
use crate::tickets::TicketId;

/// Result type alias using [`ResolverError`].
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Errors surfaced by the store, the resolution service and ingestion.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Malformed request; rejected before any provider call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No provider settings have been supplied yet.
    #[error("Resolver not initialized: configure API settings first")]
    NotConfigured,

    /// The embedding provider call failed or timed out.
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The completion provider call failed.
    #[error("Generation provider unavailable: {0}")]
    GenerationUnavailable(String),

    /// The completion provider exceeded the configured deadline.
    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(std::time::Duration),

    /// Ingestion could not find an issue or resolution column.
    #[error("Column not found: no header matches the {0} aliases")]
    ColumnNotFound(&'static str),

    /// Ingestion failed before any row was read.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Requested ticket does not exist.
    #[error("Ticket not found: {0}")]
    NotFound(TicketId),
}

impl ResolverError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_)
            | Self::NotConfigured
            | Self::ColumnNotFound(_)
            | Self::Ingestion(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::EmbeddingUnavailable(_) | Self::GenerationUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<IngestError> for ResolverError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ColumnNotFound(which) => Self::ColumnNotFound(which),
            other => Self::Ingestion(other.to_string()),
        }
    }
}

impl From<MatchError> for ResolverError {
    fn from(err: MatchError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl IntoResponse for ResolverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "Request failed");
        }
        (
            status,
            Json(json!({ "status": "error", "message": self.to_string() })),
        )
            .into_response()
    }
}
