//! # semsql
//!
//! Natural-language questions to SQL, steered by a user-editable semantic layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Semantic Layer Store (tables, synonyms, metrics)  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compile]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Prompt Compiler (question + layer + dialect)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [LlmGateway::complete]
//! ┌─────────────────────────────────────────────────────────┐
//! │        SQL Extraction (fence stripping, empty check)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [run_query]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Query Execution (pooled, time-bounded)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The schema introspector feeds semantic layer suggestions and freshness
//! checks. The HTTP API in [`web`] gates everything but liveness and
//! registration behind bearer tokens issued by [`auth`].

pub mod auth;
pub mod config;
pub mod db;
pub mod llm;
pub mod metadata;
pub mod pipeline;
pub mod prompt;
pub mod semantic;
pub mod sql;
pub mod web;

pub use config::Settings;
pub use db::{Database, QueryResult};
pub use llm::{LanguageModel, LlmError, LlmGateway, ProviderRegistry};
pub use metadata::SchemaDescription;
pub use pipeline::{QueryOutcome, QueryService};
pub use semantic::{SemanticLayer, SemanticLayerStore};
pub use sql::{extract_sql, Dialect, ExtractionError};
