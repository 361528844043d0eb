use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::config::ProviderSettings;
use crate::error::Result;
use crate::resolution::{Confidence, ResolutionResult};
use crate::tickets::{Priority, TicketId};

/// POST /api/settings - Replace the active provider configuration.
pub async fn update_settings(
    State(state): State<AppState>,
    body: std::result::Result<Json<ProviderSettings>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(mut settings) = body?;
    if settings.api_version.is_none() {
        settings.api_version = Some(state.config.providers.api_version.clone());
    }
    state.service.configure(settings)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Settings updated successfully"
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    description: String,
    #[serde(default)]
    priority: Priority,
}

#[derive(Debug, Serialize)]
pub struct SimilarTicket {
    issue: String,
    resolution: String,
    similarity: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    ticket_id: TicketId,
    resolution: String,
    confidence: Confidence,
    #[serde(rename = "similar_tickets")]
    similar_tickets: Vec<SimilarTicket>,
}

impl From<ResolutionResult> for ResolveResponse {
    fn from(result: ResolutionResult) -> Self {
        Self {
            ticket_id: result.ticket_id,
            resolution: result.resolution_text,
            confidence: result.confidence,
            similar_tickets: result
                .matches
                .into_iter()
                .map(|m| SimilarTicket {
                    issue: m.ticket.description,
                    resolution: m.ticket.resolution.unwrap_or_default(),
                    similarity: m.similarity,
                })
                .collect(),
        }
    }
}

/// POST /api/resolve - Resolve a new ticket against the historical corpus.
pub async fn resolve_ticket(
    State(state): State<AppState>,
    body: std::result::Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>> {
    let Json(req) = body?;
    let result = state.service.resolve(&req.description, req.priority).await?;
    Ok(Json(result.into()))
}
