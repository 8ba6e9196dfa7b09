//! HTTP API.
//!
//! Routes:
//! - `GET /` liveness
//! - `POST /auth/register`, `POST /auth/login`
//! - `GET /schema`, `GET /freshness` (bearer)
//! - `GET|POST /semantic`, `POST /semantic/{suggest,reload,save}` (bearer)
//! - `POST /query` (bearer)

pub mod error;
pub mod extract;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use extract::{ApiJson, AuthUser};
pub use server::{router, serve, AppState, ServerError};
