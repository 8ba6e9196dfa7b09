//! Axum server for the semsql HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::auth::{AccessControl, AuthError};
use crate::config::Settings;
use crate::db::{connect, ConnectError};
use crate::llm::{LlmGateway, ProviderRegistry};
use crate::pipeline::QueryService;
use crate::semantic::SemanticLayerStore;

/// Application state shared across handlers.
pub struct AppState {
    /// Question pipeline, semantic layer store and database.
    pub service: QueryService,
    /// Registration, login and token verification.
    pub access: AccessControl,
}

/// Errors starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("database: {0}")]
    Database(#[from] ConnectError),

    #[error("access control: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid listen address: {0}")]
    Address(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppState {
    /// Wire up every component from settings with the built-in providers.
    pub fn from_settings(settings: &Settings) -> Result<Self, ServerError> {
        Self::with_registry(settings, ProviderRegistry::with_builtins())
    }

    /// Wire up every component from settings with an explicit provider registry.
    pub fn with_registry(
        settings: &Settings,
        registry: ProviderRegistry,
    ) -> Result<Self, ServerError> {
        let db = connect(&settings.database)?;
        let dialect = settings.database.dialect();
        let layers = Arc::new(SemanticLayerStore::open(settings.semantic.path.clone()));
        let llm = Arc::new(LlmGateway::new(settings.llm.clone(), registry));
        let access = AccessControl::from_settings(&settings.auth)?;

        Ok(Self {
            service: QueryService::new(layers, llm, db, dialect),
            access,
        })
    }
}

/// Build the axum router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        // Access control
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        // Live database
        .route("/schema", get(handlers::schema))
        .route("/freshness", get(handlers::freshness))
        // Semantic layer
        .route("/semantic", get(handlers::get_semantic).post(handlers::set_semantic))
        .route("/semantic/suggest", post(handlers::suggest_semantic))
        .route("/semantic/reload", post(handlers::reload_semantic))
        .route("/semantic/save", post(handlers::save_semantic))
        // Questions
        .route("/query", post(handlers::query))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server and run until Ctrl+C.
pub async fn serve(settings: Settings) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| {
            ServerError::Address(format!(
                "{}:{} ({})",
                settings.server.host, settings.server.port, e
            ))
        })?;

    let state = Arc::new(AppState::from_settings(&settings)?);
    info!(
        database = %settings.database.connection().map(|c| c.redacted_url()).unwrap_or_default(),
        dialect = %state.service.dialect(),
        provider = %settings.llm.provider,
        semantic_layer = %settings.semantic.path.display(),
        "semsql configured"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting semsql API server on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("semsql stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
