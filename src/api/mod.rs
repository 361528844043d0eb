//! HTTP API.
//!
//! All endpoints live under `/api` and speak JSON, except `/api/upload`
//! which takes a multipart form. Failures are rendered by
//! [`ResolverError`](crate::error::ResolverError) as
//! `{"status": "error", "message": ...}`.

mod resolve;
mod tickets;
mod upload;

use axum::{
    Router,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    routing::{get, post},
};

use crate::AppState;
use crate::error::ResolverError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/settings", post(resolve::update_settings))
        .route("/api/resolve", post(resolve::resolve_ticket))
        .route("/api/upload", post(upload::upload_tickets))
        .route("/api/tickets", get(tickets::list_tickets))
        .route(
            "/api/tickets/{id}",
            get(tickets::get_ticket).patch(tickets::update_ticket),
        )
        .route("/api/stats", get(tickets::ticket_stats))
}

// Extractor rejections are input errors like any other.
impl From<JsonRejection> for ResolverError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for ResolverError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for ResolverError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}
