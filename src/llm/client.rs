//! HTTP client for Azure `OpenAI` and OpenAI-compatible APIs.
//!
//! Implements both [`EmbeddingProvider`] and [`CompletionProvider`] against
//! the `embeddings` and `chat/completions` operations. Each call is a single
//! attempt bounded by the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{CompletionProvider, CompletionRequest, EmbeddingProvider, Provider, ProviderError};
use crate::config::ProviderSettings;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the configured provider endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    settings: ProviderSettings,
    provider: Provider,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("settings", &self.settings)
            .field("provider", &self.provider)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiClient {
    /// Create a client, detecting the provider from the endpoint.
    pub fn new(settings: &ProviderSettings, timeout: Duration) -> Result<Self, ProviderError> {
        let provider =
            Provider::detect_from_url(&settings.endpoint, settings.api_version.as_deref());
        Self::with_provider(settings, provider, timeout)
    }

    /// Create a client for an explicit provider family.
    pub fn with_provider(
        settings: &ProviderSettings,
        provider: Provider,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        tracing::info!(
            endpoint = %settings.endpoint,
            embedding_model = %settings.embedding_model,
            completion_model = %settings.completion_model,
            provider = ?provider,
            "Initialized provider client"
        );

        Ok(Self {
            http,
            settings: settings.clone(),
            provider,
            timeout,
        })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let request = self
            .provider
            .authorize(self.http.post(url), &self.settings.api_key)
            .json(body);

        let response = request.send().await.map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn transport_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = &self.settings.embedding_model;
        let url = self.provider.build_embeddings_url(&self.settings.endpoint, model);
        let mut body = serde_json::json!({ "input": texts });
        if self.provider.model_in_body() {
            body["model"] = serde_json::Value::String(model.clone());
        }

        debug!(count = texts.len(), model = %model, "Requesting embeddings");
        let mut response: EmbeddingResponse = self.post_json(&url, &body).await?;

        if response.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.settings.embedding_model
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let model = &self.settings.completion_model;
        let url = self.provider.build_chat_url(&self.settings.endpoint, model);
        let mut body = serde_json::json!({
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if self.provider.model_in_body() {
            body["model"] = serde_json::Value::String(model.clone());
        }

        debug!(model = %model, "Requesting chat completion");
        let response: ChatResponse = self.post_json(&url, &body).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no completion content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.settings.completion_model
    }
}
