//! The question → SQL → rows pipeline, and semantic layer suggestions.
//!
//! ```text
//! question ─▶ query_prompt(compiled layer) ─▶ LlmGateway ─▶ extract_sql ─▶ run_query
//! schema   ─▶ suggestion_prompt            ─▶ LlmGateway ─▶ strip fences ─▶ SemanticLayer
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{run_query, Database, DbError, QueryResult};
use crate::llm::{LlmError, LlmGateway, LlmResult};
use crate::metadata::{introspect, SchemaDescription};
use crate::prompt::{query_prompt, suggestion_prompt};
use crate::semantic::{SemanticLayer, SemanticLayerStore};
use crate::sql::extract_sql;

/// What became of a question.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// SQL was generated and sent to the database. The database may still
    /// have rejected it; see [`QueryResult::Error`].
    Executed(QueryResult),

    /// The model produced no usable SQL.
    NotGenerated { error: String },
}

/// Errors from the suggestion path.
#[derive(Debug, Error)]
pub enum SuggestError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Live introspection failed. The message is already redacted.
    #[error("schema introspection failed: {0}")]
    Schema(String),

    #[error("model returned an unusable semantic layer: {0}")]
    Unparseable(String),
}

/// Runs questions and suggestions against one database and semantic layer.
pub struct QueryService {
    layers: Arc<SemanticLayerStore>,
    llm: Arc<LlmGateway>,
    db: Arc<dyn Database>,
    dialect: String,
}

impl QueryService {
    pub fn new(
        layers: Arc<SemanticLayerStore>,
        llm: Arc<LlmGateway>,
        db: Arc<dyn Database>,
        dialect: impl Into<String>,
    ) -> Self {
        Self {
            layers,
            llm,
            db,
            dialect: dialect.into(),
        }
    }

    pub fn layers(&self) -> &Arc<SemanticLayerStore> {
        &self.layers
    }

    pub fn llm(&self) -> &Arc<LlmGateway> {
        &self.llm
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// SQL dialect named in prompts.
    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    /// Answer a natural-language question.
    ///
    /// Only `ProviderUnavailable` is returned as an error. A model failure or
    /// empty answer is a normal [`QueryOutcome::NotGenerated`], and a database
    /// failure is a [`QueryResult::Error`] inside [`QueryOutcome::Executed`].
    pub async fn ask(&self, question: &str) -> LlmResult<QueryOutcome> {
        let table_info = self.layers.compiled();
        let prompt = query_prompt(question, &table_info, &self.dialect);
        debug!(prompt = %prompt, "query prompt");

        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => {
                warn!(error = %e, "completion failed");
                return Ok(QueryOutcome::NotGenerated {
                    error: e.to_string(),
                });
            }
        };

        let sql = match extract_sql(&raw) {
            Ok(sql) => sql,
            Err(e) => {
                info!("model produced no SQL");
                return Ok(QueryOutcome::NotGenerated {
                    error: e.to_string(),
                });
            }
        };
        debug!(sql = %sql, "generated SQL");

        Ok(QueryOutcome::Executed(run_query(self.db.as_ref(), &sql).await))
    }

    /// Describe the live database.
    pub async fn describe_schema(&self) -> Result<SchemaDescription, DbError> {
        introspect(self.db.as_ref()).await
    }

    /// Ask the model to propose a semantic layer for `schema`, or for the
    /// live database when no schema is given.
    pub async fn suggest(
        &self,
        schema: Option<SchemaDescription>,
    ) -> Result<SemanticLayer, SuggestError> {
        let schema = match schema {
            Some(schema) => schema,
            None => self
                .describe_schema()
                .await
                .map_err(|e| SuggestError::Schema(self.db.redact(&e.to_string())))?,
        };

        let prompt = suggestion_prompt(&schema, &self.dialect);
        debug!(tables = schema.tables.len(), "requesting semantic layer suggestion");

        let raw = self.llm.complete(&prompt).await?;
        parse_suggestion(&raw)
    }
}

/// Parse a model's semantic layer proposal, tolerating markdown fences and
/// a bare tables map.
pub fn parse_suggestion(raw: &str) -> Result<SemanticLayer, SuggestError> {
    let text = extract_sql(raw).map_err(|_| SuggestError::Unparseable("empty reply".to_string()))?;

    let value: Value =
        serde_json::from_str(&text).map_err(|e| SuggestError::Unparseable(e.to_string()))?;
    if !value.is_object() {
        return Err(SuggestError::Unparseable("expected a JSON object".to_string()));
    }

    let layer = SemanticLayer {
        tables: tables_from_value(value).map_err(|e| SuggestError::Unparseable(e.to_string()))?,
    };
    layer
        .validate()
        .map_err(|e| SuggestError::Unparseable(e.to_string()))?;
    Ok(layer)
}

/// Read a tables map from either `{"tables": {...}}` or the bare map.
/// `null` reads as no tables.
pub fn tables_from_value<T: DeserializeOwned>(
    value: Value,
) -> serde_json::Result<IndexMap<String, T>> {
    let tables = match value {
        Value::Object(mut map) if map.contains_key("tables") => {
            map.remove("tables").unwrap_or(Value::Null)
        }
        other => other,
    };

    if tables.is_null() {
        return Ok(IndexMap::new());
    }
    serde_json::from_value(tables)
}
