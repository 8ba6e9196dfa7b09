//! Semantic layer document types and their prompt rendering.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Curated metadata that steers the language model: per table, the columns
/// with their business synonyms and named metric expressions.
///
/// Tables, columns and metrics keep their document order, so rendering and
/// saving are stable across load/save cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticLayer {
    #[serde(default)]
    pub tables: IndexMap<String, TableSpec>,
}

/// Semantic metadata for one table.
///
/// Either section may be absent from a document. Absence is kept, so a
/// loaded document serializes back without gaining empty sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Column name → synonyms, most preferred first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<IndexMap<String, Vec<String>>>,

    /// Metric name → SQL expression. Expressions are opaque text; the
    /// database validates them when a generated query uses them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<IndexMap<String, String>>,
}

impl TableSpec {
    /// Columns and their synonyms in document order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.columns
            .iter()
            .flatten()
            .map(|(name, synonyms)| (name.as_str(), synonyms.as_slice()))
    }

    /// Metrics and their expressions in document order.
    pub fn metrics(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metrics
            .iter()
            .flatten()
            .map(|(name, expr)| (name.as_str(), expr.as_str()))
    }

    pub fn synonyms(&self, column: &str) -> Option<&[String]> {
        self.columns.as_ref()?.get(column).map(Vec::as_slice)
    }

    pub fn metric(&self, name: &str) -> Option<&str> {
        self.metrics.as_ref()?.get(name).map(String::as_str)
    }
}

/// A structurally invalid semantic layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    #[error("table names must be non-empty")]
    EmptyTableName,

    #[error("table '{0}' has an empty column name")]
    EmptyColumnName(String),

    #[error("table '{0}' has an empty metric name")]
    EmptyMetricName(String),
}

impl SemanticLayer {
    /// Check that every table, column and metric key is non-empty.
    pub fn validate(&self) -> Result<(), LayerError> {
        for (table, spec) in &self.tables {
            if table.trim().is_empty() {
                return Err(LayerError::EmptyTableName);
            }
            if spec.columns().any(|(c, _)| c.trim().is_empty()) {
                return Err(LayerError::EmptyColumnName(table.clone()));
            }
            if spec.metrics().any(|(m, _)| m.trim().is_empty()) {
                return Err(LayerError::EmptyMetricName(table.clone()));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Render the text embedded in query prompts.
    ///
    /// Only names appear. Synonyms and metric expressions never reach this
    /// text.
    ///
    /// ```text
    /// Table: orders
    /// Columns: id, amount
    ///
    /// Metrics: revenue
    /// ```
    pub fn compile(&self) -> String {
        let mut blocks = Vec::with_capacity(self.tables.len() * 2);

        for (table, spec) in &self.tables {
            let columns: Vec<&str> = spec.columns().map(|(name, _)| name).collect();
            blocks.push(format!("Table: {}\nColumns: {}", table, columns.join(", ")));

            let metrics: Vec<&str> = spec.metrics().map(|(name, _)| name).collect();
            if !metrics.is_empty() {
                blocks.push(format!("Metrics: {}", metrics.join(", ")));
            }
        }

        blocks.join("\n\n")
    }
}
