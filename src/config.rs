use std::env;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::error::ResolverError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub resolver: ResolverConfig,
    pub providers: ProviderConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Matching and confidence tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Number of historical matches fed to the generator.
    pub top_k: usize,
    /// Top-1 similarity at or above which confidence is `high`.
    pub high_confidence: f32,
    /// Top-1 similarity at or above which confidence is `medium`.
    pub medium_confidence: f32,
    /// Matches below this are dropped; `0.0` disables the floor.
    pub min_similarity: f32,
    /// Matches kept when nothing clears `min_similarity`.
    pub fallback_matches: usize,
    /// Texts per embedding request.
    pub embedding_batch_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            high_confidence: 0.85,
            medium_confidence: 0.6,
            min_similarity: 0.0,
            fallback_matches: 3,
            embedding_batch_size: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Deadline for each embedding or completion call.
    pub timeout_secs: u64,
    /// Azure API version used when settings do not name one.
    pub api_version: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            api_version: crate::llm::provider::DEFAULT_AZURE_API_VERSION.to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            request_timeout_secs: 120,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 5000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("resolver.top_k", 5)?
            .set_default("resolver.high_confidence", 0.85)?
            .set_default("resolver.medium_confidence", 0.6)?
            .set_default("resolver.min_similarity", 0.0)?
            .set_default("resolver.fallback_matches", 3)?
            .set_default("resolver.embedding_batch_size", 100)?
            .set_default("providers.timeout_secs", 30)?
            .set_default("providers.api_version", "2023-05-15")?
            .set_default("limits.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("limits.request_timeout_secs", 120)?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::from(Path::new("config.yaml")).required(false)),
        };

        // 3. Environment variables, e.g. TICKETS_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("TICKETS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (clap also reads PORT / HOST)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let r = &self.resolver;
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);

        if r.top_k == 0 {
            return Err(config::ConfigError::Message(
                "resolver.top_k must be positive".to_string(),
            ));
        }
        if r.embedding_batch_size == 0 {
            return Err(config::ConfigError::Message(
                "resolver.embedding_batch_size must be positive".to_string(),
            ));
        }
        if !in_unit(r.high_confidence) || !in_unit(r.medium_confidence) || !in_unit(r.min_similarity)
        {
            return Err(config::ConfigError::Message(
                "resolver thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if r.medium_confidence > r.high_confidence {
            return Err(config::ConfigError::Message(
                "resolver.medium_confidence cannot exceed resolver.high_confidence".to_string(),
            ));
        }
        if self.providers.timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "providers.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors from validating provider settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} cannot be empty")]
    Missing(&'static str),

    #[error("endpoint is not a valid http(s) URL: {0}")]
    InvalidEndpoint(String),
}

impl From<SettingsError> for ResolverError {
    fn from(err: SettingsError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Provider credentials and model/deployment names.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub api_key: String,
    pub endpoint: String,
    pub embedding_model: String,
    pub completion_model: String,
    #[serde(default)]
    pub api_version: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("embedding_model", &self.embedding_model)
            .field("completion_model", &self.completion_model)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl ProviderSettings {
    /// Trim fields and check them; rejected settings never reach a client.
    pub fn validated(mut self) -> Result<Self, SettingsError> {
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.embedding_model = self.embedding_model.trim().to_string();
        self.completion_model = self.completion_model.trim().to_string();
        self.api_version = self
            .api_version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if self.api_key.is_empty() {
            return Err(SettingsError::Missing("apiKey"));
        }
        if self.endpoint.is_empty() {
            return Err(SettingsError::Missing("endpoint"));
        }
        if self.embedding_model.is_empty() {
            return Err(SettingsError::Missing("embeddingModel"));
        }
        if self.completion_model.is_empty() {
            return Err(SettingsError::Missing("completionModel"));
        }

        match url::Url::parse(&self.endpoint) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
            _ => return Err(SettingsError::InvalidEndpoint(self.endpoint)),
        }

        Ok(self)
    }

    /// Whether switching from `self` to `other` invalidates cached vectors.
    pub fn embedding_space_differs(&self, other: &Self) -> bool {
        self.endpoint != other.endpoint || self.embedding_model != other.embedding_model
    }
}

/// Bootstrap provider settings from `AZURE_OPENAI_*` env vars.
///
/// Returns `None` when neither key nor endpoint is set.
pub fn load_provider_settings(
    default_api_version: &str,
) -> Option<Result<ProviderSettings, SettingsError>> {
    let api_key = env::var("AZURE_OPENAI_API_KEY").ok();
    let endpoint = env::var("AZURE_OPENAI_ENDPOINT").ok();
    if api_key.is_none() && endpoint.is_none() {
        return None;
    }

    let settings = ProviderSettings {
        api_key: api_key.unwrap_or_default(),
        endpoint: endpoint.unwrap_or_default(),
        embedding_model: env::var("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
            .unwrap_or_else(|_| "text-embedding-ada-002".to_string()),
        completion_model: env::var("AZURE_OPENAI_COMPLETION_DEPLOYMENT")
            .unwrap_or_else(|_| "gpt-4o".to_string()),
        api_version: Some(
            env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| default_api_version.to_string()),
        ),
    };
    Some(settings.validated())
}
