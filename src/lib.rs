//! Ticket Resolver
//!
//! Suggests resolutions for new support tickets by finding the most similar
//! historical tickets (embedding cosine similarity) and asking a completion
//! model to write an answer grounded in them.
//!
//! # Architecture
//!
//! - **Server**: Axum JSON API (`/api/resolve`, `/api/upload`, `/api/tickets`, ...)
//! - **Resolution**: embed, rank, generate; one request at a time per ticket
//! - **Providers**: Azure `OpenAI` / OpenAI-compatible HTTP clients behind traits
//! - **Store**: in-memory tickets with a per-ticket embedding cache
//!
//! # Modules
//!
//! - [`tickets`]: ticket model and thread-safe store
//! - [`matching`]: cosine similarity and top-k ranking
//! - [`llm`]: embedding/completion provider traits and HTTP client
//! - [`ingest`]: CSV/Excel import of historical tickets
//! - [`resolution`]: the resolution pipeline
//! - [`api`]: HTTP handlers

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod matching;
pub mod resolution;
pub mod server;
pub mod tickets;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::resolution::ResolutionService;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Resolution pipeline; also owns the ticket store.
    pub service: Arc<ResolutionService>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Fresh state with an empty store and no providers.
    pub fn new(config: AppConfig) -> Self {
        let service = ResolutionService::new(
            tickets::TicketStore::new(),
            config.resolver.clone(),
            config.providers.timeout(),
        );
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
        }
    }
}
