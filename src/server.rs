use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppState;
use crate::api;
use crate::config::{AppConfig, load_provider_settings};

/// Assemble the router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let limits = state.config.limits.clone();
    let timeout_duration = Duration::from_secs(limits.request_timeout_secs);

    api::router()
        .layer(DefaultBodyLimit::max(limits.max_upload_bytes))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (
                        StatusCode::REQUEST_TIMEOUT,
                        axum::Json(json!({ "status": "error", "message": "Request timed out" })),
                    )
                        .into_response(),
                }
            },
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let default_api_version = config.providers.api_version.clone();
    let state = AppState::new(config);

    // Providers from AZURE_OPENAI_* are optional; /api/settings can supply them later.
    match load_provider_settings(&default_api_version) {
        Some(Ok(settings)) => {
            if let Err(e) = state.service.configure(settings) {
                warn!(error = %e, "Ignoring provider settings from environment");
            }
        }
        Some(Err(e)) => warn!(error = %e, "Ignoring provider settings from environment"),
        None => info!("No provider settings in environment; waiting for /api/settings"),
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
