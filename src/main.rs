//! Ticket Resolver Server
//!
//! Entry point for the ticket resolution API.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use dotenvy::dotenv;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ticket_resolver::config::AppConfig;
use ticket_resolver::server::start_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment
    let _ = dotenv();

    // Initialize tracing (M-LOG-STRUCTURED); LOG_FORMAT=json for machine output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }

    let config = AppConfig::load()?;
    tracing::info!(
        name: "config.loaded",
        port = config.server.port,
        top_k = config.resolver.top_k,
        timeout_secs = config.providers.timeout_secs,
        "Configuration loaded"
    );

    start_server(config).await
}
