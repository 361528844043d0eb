//! Resolution orchestration.
//!
//! [`ResolutionService::resolve`] persists the submitted ticket, embeds it,
//! ranks it against the historical corpus and asks the completion provider
//! for a resolution grounded in the best matches. Provider calls run with no
//! store lock held and are each bounded by the configured timeout; there are
//! no automatic retries.

mod prompt;

pub use prompt::{SYSTEM_PROMPT, build_prompt};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ProviderSettings, ResolverConfig};
use crate::error::{ResolverError, Result};
use crate::llm::{
    CompletionRequest, EmbeddingProvider, Message, OpenAiClient, ProviderError, Providers,
};
use crate::matching::{MatchResult, apply_floor, rank};
use crate::tickets::{
    CorpusEntry, Priority, Ticket, TicketId, TicketStatus, TicketStore, TicketUpdate,
};

/// Returned when the corpus has nothing to compare against.
pub const NO_MATCHES_RESOLUTION: &str =
    "No similar historical tickets found. This may require manual investigation.";

/// Qualitative confidence derived from the top match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_similarity(similarity: f32, config: &ResolverConfig) -> Self {
        if similarity >= config.high_confidence {
            Self::High
        } else if similarity >= config.medium_confidence {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Outcome of one resolution request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    /// The persisted submitted ticket.
    pub ticket_id: TicketId,
    pub resolution_text: String,
    pub confidence: Confidence,
    /// Best matches, similarity non-increasing, at most `top_k`.
    pub matches: Vec<MatchResult>,
}

/// Moves a submitted ticket to `pending` unless disarmed.
#[derive(Debug)]
struct PendingOnDrop<'a> {
    store: &'a TicketStore,
    ticket_id: TicketId,
    armed: bool,
}

impl<'a> PendingOnDrop<'a> {
    fn new(store: &'a TicketStore, ticket_id: TicketId) -> Self {
        Self {
            store,
            ticket_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self
                .store
                .update(self.ticket_id, TicketUpdate::status(TicketStatus::Pending));
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveProviders {
    providers: Providers,
    settings: Option<ProviderSettings>,
}

/// Orchestrates embedding, ranking and generation.
#[derive(Debug)]
pub struct ResolutionService {
    store: TicketStore,
    providers: RwLock<Option<ActiveProviders>>,
    config: ResolverConfig,
    timeout: Duration,
}

impl ResolutionService {
    pub fn new(store: TicketStore, config: ResolverConfig, timeout: Duration) -> Self {
        Self {
            store,
            providers: RwLock::new(None),
            config,
            timeout,
        }
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.providers.read().is_some()
    }

    /// Validate `settings`, build a client and make it the active provider.
    pub fn configure(&self, settings: ProviderSettings) -> Result<()> {
        let settings = settings.validated()?;
        let client = OpenAiClient::new(&settings, self.timeout)
            .map_err(|e| ResolverError::InvalidInput(e.to_string()))?;

        let mut active = self.providers.write();
        let invalidate = match active.as_ref().and_then(|a| a.settings.as_ref()) {
            Some(previous) => previous.embedding_space_differs(&settings),
            None => active.is_some(),
        };
        if invalidate {
            self.store.invalidate_embeddings();
        }

        info!(
            name: "settings.updated",
            endpoint = %settings.endpoint,
            embedding_model = %settings.embedding_model,
            completion_model = %settings.completion_model,
            embeddings_invalidated = invalidate,
            "Provider settings updated"
        );
        *active = Some(ActiveProviders {
            providers: Providers::shared(Arc::new(client)),
            settings: Some(settings),
        });
        Ok(())
    }

    /// Install a provider pair directly; cached embeddings are dropped.
    pub fn install(&self, providers: Providers) {
        let mut active = self.providers.write();
        self.store.invalidate_embeddings();
        *active = Some(ActiveProviders {
            providers,
            settings: None,
        });
    }

    /// Resolve a new ticket description.
    ///
    /// The ticket is stored before any provider call. On success it is
    /// marked resolved with the generated text; on any failure, or when the
    /// corpus is empty, it is left `pending`.
    pub async fn resolve(&self, description: &str, priority: Priority) -> Result<ResolutionResult> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ResolverError::InvalidInput(
                "description cannot be empty".to_string(),
            ));
        }

        let ticket_id = self.store.add(Ticket::submitted(description, priority));
        info!(name: "ticket.created", ticket_id = %ticket_id, "Ticket submitted");

        // Marks the ticket pending on error and when this future is dropped
        // mid-flight (request timeout, client disconnect).
        let guard = PendingOnDrop::new(&self.store, ticket_id);
        let result = self.run(ticket_id, description).await?;

        if !result.matches.is_empty() {
            self.store.update(
                ticket_id,
                TicketUpdate::resolved_with(result.resolution_text.clone()),
            )?;
            guard.disarm();
        }
        info!(
            name: "resolution.completed",
            ticket_id = %ticket_id,
            confidence = ?result.confidence,
            matches = result.matches.len(),
            "Resolution completed"
        );
        Ok(result)
    }

    async fn run(&self, ticket_id: TicketId, description: &str) -> Result<ResolutionResult> {
        // Providers and epoch are read together so a concurrent settings
        // change cannot mix vectors from two models in one ranking.
        let (providers, epoch) = {
            let active = self.providers.read();
            let providers = active
                .as_ref()
                .map(|a| a.providers.clone())
                .ok_or(ResolverError::NotConfigured)?;
            (providers, self.store.embedding_epoch())
        };

        let query = self
            .embed(providers.embedder.as_ref(), &[description.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResolverError::EmbeddingUnavailable("empty response".to_string()))?;

        let mut corpus = self.store.corpus(epoch);
        self.fill_embeddings(providers.embedder.as_ref(), &mut corpus, epoch)
            .await?;

        let ranked = rank(
            &query,
            corpus
                .iter()
                .filter_map(|e| e.embedding.as_ref().map(|v| (&e.ticket, Arc::clone(v)))),
            self.config.top_k,
        )?;
        let matches = apply_floor(
            ranked,
            self.config.min_similarity,
            self.config.fallback_matches,
        );

        let Some(top) = matches.first() else {
            return Ok(ResolutionResult {
                ticket_id,
                resolution_text: NO_MATCHES_RESOLUTION.to_string(),
                confidence: Confidence::Low,
                matches,
            });
        };
        let confidence = Confidence::from_similarity(top.similarity, &self.config);

        let request = CompletionRequest {
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(build_prompt(description, &matches)),
            ],
            temperature: 0.3,
            max_tokens: 1000,
        };

        let resolution_text =
            match tokio::time::timeout(self.timeout, providers.generator.complete(request)).await {
                Ok(Ok(text)) => text,
                Ok(Err(ProviderError::Timeout(_))) | Err(_) => {
                    warn!(
                        name: "resolution.generation_timeout",
                        ticket_id = %ticket_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Generation timed out"
                    );
                    return Err(ResolverError::GenerationTimeout(self.timeout));
                }
                Ok(Err(e)) => {
                    warn!(
                        name: "resolution.generation_failed",
                        ticket_id = %ticket_id,
                        error = %e,
                        "Generation failed"
                    );
                    return Err(ResolverError::GenerationUnavailable(e.to_string()));
                }
            };

        Ok(ResolutionResult {
            ticket_id,
            resolution_text,
            confidence,
            matches,
        })
    }

    /// Compute and cache vectors for corpus entries that lack one.
    async fn fill_embeddings(
        &self,
        embedder: &dyn EmbeddingProvider,
        corpus: &mut [CorpusEntry],
        epoch: u64,
    ) -> Result<()> {
        let missing: Vec<usize> = corpus
            .iter()
            .enumerate()
            .filter(|(_, e)| e.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        info!(
            count = missing.len(),
            batch_size = self.config.embedding_batch_size,
            "Embedding historical tickets"
        );

        for batch in missing.chunks(self.config.embedding_batch_size) {
            let texts: Vec<String> = batch
                .iter()
                .map(|&i| corpus[i].ticket.description.clone())
                .collect();
            let vectors = self.embed(embedder, &texts).await?;

            for (&i, vector) in batch.iter().zip(vectors) {
                let vector: Arc<[f32]> = Arc::from(vector);
                let entry = &mut corpus[i];
                self.store.commit_embedding(
                    entry.ticket.id,
                    entry.revision,
                    epoch,
                    Arc::clone(&vector),
                );
                entry.embedding = Some(vector);
            }
        }
        Ok(())
    }

    async fn embed(
        &self,
        embedder: &dyn EmbeddingProvider,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        match tokio::time::timeout(self.timeout, embedder.embed(texts)).await {
            Ok(Ok(vectors)) if vectors.len() == texts.len() => Ok(vectors),
            Ok(Ok(vectors)) => Err(ResolverError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))),
            Ok(Err(e)) => {
                warn!(name: "resolution.embedding_failed", error = %e, "Embedding failed");
                Err(ResolverError::EmbeddingUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(
                    name: "resolution.embedding_failed",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Embedding timed out"
                );
                Err(ResolverError::EmbeddingUnavailable(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds by keyword so similarities are predictable.
    #[derive(Debug, Default)]
    struct KeywordEmbedder {
        calls: AtomicUsize,
        texts: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("outlook") { 1.0 } else { 0.0 },
                        if t.contains("vpn") { 1.0 } else { 0.0 },
                        if t.contains("crash") { 0.3 } else { 0.0 },
                    ]
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    #[derive(Debug, Default)]
    struct ScriptedGenerator {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl CompletionProvider for ScriptedGenerator {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ProviderError::Http("connection reset".to_string()));
            }
            assert_eq!(request.messages[0].content, SYSTEM_PROMPT);
            Ok("Update Outlook to the latest build.".to_string())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn seeded_store() -> TicketStore {
        let store = TicketStore::new();
        store.add(Ticket::imported(
            "Outlook crashes on launch",
            "Update Outlook",
            Priority::High,
        ));
        store.add(Ticket::imported(
            "VPN disconnects hourly",
            "Reinstall VPN client",
            Priority::Medium,
        ));
        store.add(Ticket::imported(
            "Printer jams",
            "Clear the tray",
            Priority::Low,
        ));
        store
    }

    fn service(
        store: TicketStore,
        embedder: Arc<KeywordEmbedder>,
        generator: Arc<ScriptedGenerator>,
    ) -> ResolutionService {
        let service =
            ResolutionService::new(store, ResolverConfig::default(), Duration::from_secs(5));
        service.install(Providers::new(embedder, generator));
        service
    }

    #[test]
    fn test_confidence_thresholds() {
        let config = ResolverConfig::default();
        assert_eq!(Confidence::from_similarity(0.90, &config), Confidence::High);
        assert_eq!(Confidence::from_similarity(0.85, &config), Confidence::High);
        assert_eq!(Confidence::from_similarity(0.70, &config), Confidence::Medium);
        assert_eq!(Confidence::from_similarity(0.60, &config), Confidence::Medium);
        assert_eq!(Confidence::from_similarity(0.40, &config), Confidence::Low);
    }

    #[tokio::test]
    async fn test_empty_description_makes_no_provider_calls() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let store = seeded_store();
        let svc = service(store.clone(), embedder.clone(), generator.clone());

        let err = svc.resolve("   ", Priority::Medium).await.unwrap_err();
        assert!(matches!(err, ResolverError::InvalidInput(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_outlook_ticket_resolves_with_high_confidence() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let store = seeded_store();
        let svc = service(store.clone(), embedder, generator.clone());

        let result = svc
            .resolve("Outlook keeps crashing", Priority::High)
            .await
            .unwrap();

        assert_eq!(result.matches[0].ticket.description, "Outlook crashes on launch");
        assert!(result.matches[0].similarity >= 0.85);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.resolution_text, "Update Outlook to the latest build.");
        assert_eq!(result.matches.len(), 3);
        assert!(
            result
                .matches
                .windows(2)
                .all(|w| w[0].similarity >= w[1].similarity)
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        let ticket = store.get(result.ticket_id).unwrap();
        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert_eq!(
            ticket.resolution.as_deref(),
            Some("Update Outlook to the latest build.")
        );
        // The submitted ticket never joins the corpus.
        assert_eq!(store.corpus(store.embedding_epoch()).len(), 3);
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_ticket_pending() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator {
            fail: true,
            ..ScriptedGenerator::default()
        });
        let store = seeded_store();
        let svc = service(store.clone(), embedder, generator);

        let err = svc.resolve("VPN drops", Priority::Low).await.unwrap_err();
        assert!(matches!(err, ResolverError::GenerationUnavailable(_)));

        let submitted = store.list(&crate::tickets::TicketFilter {
            status: Some(TicketStatus::Pending),
            priority: None,
        });
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].description, "VPN drops");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_generation_times_out() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator {
            delay: Some(Duration::from_secs(60)),
            ..ScriptedGenerator::default()
        });
        let svc = ResolutionService::new(
            seeded_store(),
            ResolverConfig::default(),
            Duration::from_millis(100),
        );
        svc.install(Providers::new(embedder, generator));

        let err = svc.resolve("Outlook crash", Priority::High).await.unwrap_err();
        assert!(matches!(err, ResolverError::GenerationTimeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_resolution_leaves_ticket_pending() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator {
            delay: Some(Duration::from_secs(20)),
            ..ScriptedGenerator::default()
        });
        let store = seeded_store();
        let svc = ResolutionService::new(
            store.clone(),
            ResolverConfig::default(),
            Duration::from_secs(30),
        );
        svc.install(Providers::new(embedder, generator.clone()));

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            svc.resolve("Outlook crash again", Priority::High),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        let submitted: Vec<_> = store
            .list(&crate::tickets::TicketFilter::default())
            .into_iter()
            .filter(|t| t.description == "Outlook crash again")
            .collect();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].status, TicketStatus::Pending);
    }

    #[tokio::test]
    async fn test_embedding_failure() {
        let embedder = Arc::new(KeywordEmbedder {
            fail: true,
            ..KeywordEmbedder::default()
        });
        let generator = Arc::new(ScriptedGenerator::default());
        let store = seeded_store();
        let svc = service(store.clone(), embedder, generator.clone());

        let err = svc.resolve("Outlook crash", Priority::High).await.unwrap_err();
        assert!(matches!(err, ResolverError::EmbeddingUnavailable(_)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_service() {
        let store = seeded_store();
        let svc = ResolutionService::new(
            store.clone(),
            ResolverConfig::default(),
            Duration::from_secs(5),
        );
        assert!(!svc.is_configured());

        let err = svc.resolve("Outlook crash", Priority::High).await.unwrap_err();
        assert!(matches!(err, ResolverError::NotConfigured));
        // The ticket is still recorded.
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_corpus_skips_generation() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let store = TicketStore::new();
        let svc = service(store.clone(), embedder, generator.clone());

        let result = svc.resolve("Outlook crash", Priority::High).await.unwrap();
        assert_eq!(result.resolution_text, NO_MATCHES_RESOLUTION);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.matches.is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.get(result.ticket_id).unwrap().status,
            TicketStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_corpus_embeddings_are_cached() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let svc = service(seeded_store(), embedder.clone(), generator);

        svc.resolve("Outlook crash", Priority::High).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 4);

        svc.resolve("VPN slow", Priority::Low).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_corpus_embedded_in_batches() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let config = ResolverConfig {
            embedding_batch_size: 2,
            ..ResolverConfig::default()
        };
        let svc = ResolutionService::new(seeded_store(), config, Duration::from_secs(5));
        svc.install(Providers::new(embedder.clone(), generator));

        svc.resolve("Outlook crash", Priority::High).await.unwrap();
        // One query call plus two corpus batches (2 + 1).
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reinstall_invalidates_cache() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let svc = service(seeded_store(), embedder.clone(), generator.clone());

        svc.resolve("Outlook crash", Priority::High).await.unwrap();
        svc.install(Providers::new(embedder.clone(), generator));
        svc.resolve("Outlook crash", Priority::High).await.unwrap();
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 8);
    }
}
