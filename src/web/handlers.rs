//! HTTP handlers.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::error::ApiError;
use super::extract::{ApiJson, AuthUser};
use super::server::AppState;
use crate::db::{compute_freshness, FreshnessEntry, QueryResult};
use crate::metadata::{SchemaDescription, TableSchema};
use crate::pipeline::{tables_from_value, QueryOutcome};
use crate::semantic::SemanticLayer;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SetLayerRequest {
    /// `null` or missing resets to the empty layer.
    #[serde(default)]
    pub semantic_layer: Option<SemanticLayer>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub semantic_layer: SemanticLayer,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub suggested: SemanticLayer,
}

#[derive(Debug, Serialize)]
pub struct FreshnessResponse {
    pub freshness: Vec<FreshnessEntry>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// Body of `POST /query`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Answered { success: bool, response: QueryResult },
    Failed { success: bool, error: String },
}

// ============================================================================
// Public
// ============================================================================

/// GET / - Liveness
pub async fn root() -> Json<Value> {
    Json(serde_json::json!({ "message": "semsql is up!" }))
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<Credentials>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.access.register(&req.username, &req.password).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<Credentials>,
) -> Result<Json<TokenResponse>, ApiError> {
    let access_token = state.access.login(&req.username, &req.password).await?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

// ============================================================================
// Schema
// ============================================================================

/// GET /schema - Live schema, read fresh on every call
pub async fn schema(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchemaDescription>, ApiError> {
    let schema = state.service.describe_schema().await.map_err(|e| {
        let detail = state.service.db().redact(&e.to_string());
        ApiError::internal("schema introspection failed", detail)
    })?;
    Ok(Json(schema))
}

/// GET /freshness
pub async fn freshness(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<FreshnessResponse>, ApiError> {
    let db = state.service.db();
    let freshness = compute_freshness(db.as_ref())
        .await
        .map_err(|e| ApiError::internal("freshness check failed", db.redact(&e.to_string())))?;
    Ok(Json(FreshnessResponse { freshness }))
}

// ============================================================================
// Semantic Layer
// ============================================================================

/// GET /semantic
pub async fn get_semantic(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Json<SemanticLayer> {
    Json(state.service.layers().get())
}

/// POST /semantic - Replace the in-memory layer
pub async fn set_semantic(
    AuthUser(user): AuthUser,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SetLayerRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if let Some(layer) = &req.semantic_layer {
        layer
            .validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
    }

    state.service.layers().set(req.semantic_layer);
    info!(user = %user, "semantic layer updated");
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /semantic/reload - Discard in-memory edits
pub async fn reload_semantic(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Json<ReloadResponse> {
    let semantic_layer = state.service.layers().reload();
    Json(ReloadResponse {
        success: true,
        semantic_layer,
    })
}

/// POST /semantic/save
pub async fn save_semantic(
    AuthUser(user): AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SaveResponse>, ApiError> {
    let path = state.service.layers().save(None)?;
    info!(user = %user, path = %path.display(), "semantic layer saved");
    Ok(Json(SaveResponse {
        success: true,
        path: path.display().to_string(),
    }))
}

/// POST /semantic/suggest - Propose a layer for the posted or live schema
///
/// Accepts `{"tables": {...}}`, a bare tables map, or an empty body / `{}`
/// to introspect the live database.
pub async fn suggest_semantic(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SuggestResponse>, ApiError> {
    let schema = parse_schema_body(&body)?;
    let suggested = state.service.suggest(schema).await?;
    Ok(Json(SuggestResponse { suggested }))
}

fn parse_schema_body(body: &[u8]) -> Result<Option<SchemaDescription>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Validation(e.to_string()))?;
    let tables = tables_from_value::<TableSchema>(value)
        .map_err(|e| ApiError::Validation(format!("invalid schema: {}", e)))?;

    if tables.is_empty() {
        return Ok(None);
    }
    Ok(Some(SchemaDescription { tables }))
}

// ============================================================================
// Query
// ============================================================================

/// POST /query - Question in, SQL and rows out
pub async fn query(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ApiError::Validation("question must not be empty".to_string()));
    }

    let response = match state.service.ask(question).await? {
        QueryOutcome::Executed(response) => QueryResponse::Answered {
            success: true,
            response,
        },
        QueryOutcome::NotGenerated { error } => {
            warn!(error = %error, "no SQL generated");
            QueryResponse::Failed {
                success: false,
                error,
            }
        }
    };
    Ok(Json(response))
}
