//! Provider-specific configuration and detection.
//!
//! Azure `OpenAI` addresses models by deployment name in the URL path and
//! authenticates with an `api-key` header; OpenAI-compatible services take
//! the model in the request body and a bearer token.

/// Default Azure API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2023-05-15";

/// Supported provider families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service
    AzureOpenAI {
        /// API version (e.g., "2023-05-15")
        api_version: String,
    },
    /// Generic OpenAI-compatible provider
    Generic,
}

impl Provider {
    /// Detect provider from the endpoint URL.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let provider = Provider::detect_from_url("https://api.openai.com", None);
    /// assert_eq!(provider, Provider::OpenAI);
    /// ```
    #[must_use]
    pub fn detect_from_url(endpoint: &str, api_version: Option<&str>) -> Self {
        let lower = endpoint.to_lowercase();

        if lower.contains("azure.com") {
            Self::AzureOpenAI {
                api_version: api_version
                    .unwrap_or(DEFAULT_AZURE_API_VERSION)
                    .to_string(),
            }
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Whether requests carry the model name in the body.
    #[must_use]
    pub fn model_in_body(&self) -> bool {
        !matches!(self, Self::AzureOpenAI { .. })
    }

    /// Build the chat completions URL.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - The base URL (trailing slash optional)
    /// * `deployment` - Model or Azure deployment name
    #[must_use]
    pub fn build_chat_url(&self, endpoint: &str, deployment: &str) -> String {
        self.build_url(endpoint, deployment, "chat/completions")
    }

    /// Build the embeddings URL.
    #[must_use]
    pub fn build_embeddings_url(&self, endpoint: &str, deployment: &str) -> String {
        self.build_url(endpoint, deployment, "embeddings")
    }

    fn build_url(&self, endpoint: &str, deployment: &str, operation: &str) -> String {
        let base = endpoint.trim_end_matches('/');

        match self {
            Self::AzureOpenAI { api_version } => {
                format!(
                    "{base}/openai/deployments/{deployment}/{operation}?api-version={api_version}"
                )
            }
            _ if base.ends_with("/v1") => format!("{base}/{operation}"),
            _ => format!("{base}/v1/{operation}"),
        }
    }

    /// Attach credentials the way this provider expects them.
    pub fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        match self {
            Self::AzureOpenAI { .. } => request.header("api-key", api_key),
            _ => request.bearer_auth(api_key),
        }
    }
}
