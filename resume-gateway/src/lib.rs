//! Resume Gateway - Chat and resume analysis in front of Gemini.
//!
//! This crate provides the HTTP service behind the resume chat page:
//! - Multi-turn chat with per-session conversation history
//! - PDF resume upload, text extraction, and model analysis
//! - Session clearing and optional session bounds (LRU, idle TTL)
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (trace → route) → SessionStore → Conversation → Gemini
//!                       ↓
//!                 PDF extraction
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod conversation;
pub mod document;
pub mod error;
pub mod pages;
pub mod provider;
pub mod routes;
pub mod session;

pub use conversation::{ChatModel, Conversation};
pub use document::{ExtractionError, PdfTextExtractor, TextExtractor};
pub use error::{ApiError, ErrorResponse, Operation};
pub use provider::{
    ChatRequest, ChatResponse, GeminiProvider, Message, Provider, ProviderError, TokenUsage,
};
pub use routes::AppState;
pub use session::{SessionClearOutcome, SessionError, SessionStore};

use axum::{middleware, Router};
use resume_common::config::{Config, WebConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState, web: &WebConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_routes(state, web)
        .merge(routes::health_routes())
        .merge(routes::static_routes(&static_dir(web)))
        .layer(middleware::from_fn(resume_common::logging::trace_requests))
        .layer(cors)
}

/// Configured static directory, falling back to the assets bundled with the crate.
fn static_dir(web: &WebConfig) -> PathBuf {
    if web.static_dir.is_dir() {
        return web.static_dir.clone();
    }
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static"))
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let gemini = GeminiProvider::new(config.gemini_api_key(), &config.llm)?;
    if gemini.has_api_key() {
        tracing::info!(model = %config.llm.model, "Gemini provider configured");
    } else {
        tracing::error!(
            "GEMINI_API_KEY is not set; chat and resume analysis will fail until it is configured"
        );
    }

    let state = AppState::from_config(config, Arc::new(gemini))?;

    let sweeper = config.sessions.idle_ttl_secs.map(|ttl| {
        tracing::info!(
            idle_ttl_secs = ttl,
            every_secs = config.sessions.sweep_interval_secs,
            "Session sweeper enabled"
        );
        session::spawn_sweeper(
            &state.sessions,
            Duration::from_secs(config.sessions.sweep_interval_secs),
        )
    });

    let router = build_router(state, &config.web);

    tracing::info!("Starting Resume Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("Resume Gateway stopped");

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
