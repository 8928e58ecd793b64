//! chat-gateway server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket endpoint and a health
//! probe.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chat_gateway::app_state::AppState;
use chat_gateway::config::ChatConfig;
use chat_gateway::domain::{ConnectionRegistry, MessageStore, RoomDirectory};
use chat_gateway::identity::{IdentityProvider, StaticIdentityProvider};
use chat_gateway::persistence::{PersistenceLayer, PostgresPersistence};
use chat_gateway::service::RoomSessionManager;
use chat_gateway::ws::handler::ws_handler;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ChatConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(addr = %config.listen_addr, "starting chat-gateway");

    // Optional durable recorder
    let recorder: Option<Arc<dyn PersistenceLayer>> = if config.persistence_enabled {
        let persistence = PostgresPersistence::connect(&config).await?;
        tracing::info!("durable message log enabled");
        Some(Arc::new(persistence))
    } else {
        None
    };

    // Build domain layer
    let (store, directory) = match recorder {
        Some(recorder) => {
            let store = Arc::new(MessageStore::with_recorder(Arc::clone(&recorder)));
            let directory = Arc::new(RoomDirectory::with_recorder(
                Arc::clone(&store),
                config.room_capacity,
                recorder,
            ));
            (store, directory)
        }
        None => {
            let store = Arc::new(MessageStore::new());
            let directory = Arc::new(RoomDirectory::new(
                Arc::clone(&store),
                config.room_capacity,
            ));
            (store, directory)
        }
    };
    let registry = Arc::new(ConnectionRegistry::new());

    // Build service layer
    let sessions = Arc::new(RoomSessionManager::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        Arc::clone(&registry),
        config.session_mailbox_capacity,
        config.history_page_size,
        config.echo_to_sender,
    ));

    // External identity collaborator, seeded from configuration
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(StaticIdentityProvider::from_seed(&config.identity_tokens));

    // Build application state
    let app_state = AppState {
        directory,
        store,
        registry,
        sessions,
        identity,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ws/rooms/{room_id}", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
