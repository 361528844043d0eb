//! Embedding and completion provider abstractions.
//!
//! The resolution pipeline talks to two external capabilities: turning text
//! into vectors ([`EmbeddingProvider`]) and turning a prompt into a
//! resolution ([`CompletionProvider`]). Both are traits so the service can be
//! exercised without network access.
//!
//! # Implementations
//!
//! - [`OpenAiClient`]: Azure `OpenAI` and OpenAI-compatible HTTP APIs
//!
//! # Example
//!
//! ```rust,ignore
//! use ticket_resolver::config::ProviderSettings;
//! use ticket_resolver::llm::OpenAiClient;
//!
//! let client = OpenAiClient::new(&settings, Duration::from_secs(30))?;
//! let vectors = client.embed(&["VPN drops".to_string()]).await?;
//! ```

pub mod client;
pub mod provider;

pub use client::OpenAiClient;
pub use provider::Provider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider answered with a non-success status.
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The call did not finish within the deadline.
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The response body did not have the expected shape.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Non-streaming chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Converts text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Embed each text; output order matches input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    fn model_name(&self) -> &str;
}

/// Produces a natural-language completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync + std::fmt::Debug {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;

    fn model_name(&self) -> &str;
}

/// The provider pair the resolution service works with.
#[derive(Debug, Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn CompletionProvider>,
}

impl Providers {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            embedder,
            generator,
        }
    }

    /// Both roles served by one client.
    pub fn shared<P>(client: Arc<P>) -> Self
    where
        P: EmbeddingProvider + CompletionProvider + 'static,
    {
        Self {
            embedder: Arc::clone(&client) as Arc<dyn EmbeddingProvider>,
            generator: client,
        }
    }
}
