//! API error responses.
//!
//! Every failure leaves the service as `{"detail": "..."}` with a status
//! chosen here. Internal details stay in the logs.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;
use crate::llm::LlmError;
use crate::pipeline::SuggestError;
use crate::semantic::StoreError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Errors surfaced by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// 401, with a `WWW-Authenticate: Bearer` challenge.
    Unauthorized(String),
    /// 409
    Conflict(String),
    /// 422
    Validation(String),
    /// 503
    ProviderUnavailable(String),
    /// 502
    BadGateway(String),
    /// 500, generic message.
    Internal,
}

impl ApiError {
    pub fn not_authenticated() -> Self {
        ApiError::Unauthorized("Not authenticated".to_string())
    }

    /// Log `err` and return a generic 500.
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!(error = %err, "{}", context);
        ApiError::Internal
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> &str {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::Conflict(m)
            | ApiError::Validation(m)
            | ApiError::ProviderUnavailable(m)
            | ApiError::BadGateway(m) => m,
            ApiError::Internal => INTERNAL_MESSAGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.detail() }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Conflict => ApiError::Conflict(err.to_string()),
            AuthError::Validation(message) => ApiError::Validation(message),
            other => ApiError::internal("access control failure", other),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ProviderUnavailable { .. } => ApiError::ProviderUnavailable(err.to_string()),
            LlmError::BadResponse(_) => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<SuggestError> for ApiError {
    fn from(err: SuggestError) -> Self {
        match err {
            SuggestError::Llm(e) => e.into(),
            SuggestError::Unparseable(_) => ApiError::BadGateway(err.to_string()),
            SuggestError::Schema(_) => ApiError::internal("schema introspection failed", err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal("semantic layer store failure", err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
