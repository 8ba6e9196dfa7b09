//! Query execution layer.
//!
//! [`Database`] is the dialect-aware seam between the service and a concrete
//! engine. The shipped engine is SQLite ([`SqliteDatabase`]); other drivers
//! plug in by implementing the trait.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Database                          │
//! │  - list_tables() / table_columns() / primary_key() / ... │
//! │  - execute(sql)          (engine error text preserved)   │
//! │  - max_value(table, col) (freshness probes)              │
//! └──────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │     ConnectionPool  →  spawn_blocking + timeout          │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod freshness;
mod pool;
mod sqlite;

pub use freshness::{compute_freshness, FreshnessEntry, TIMESTAMP_CANDIDATES};
pub use pool::{ConnectionPool, PooledConnection};
pub use sqlite::SqliteDatabase;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{ConnectionConfig, DatabaseSettings, Driver};
use crate::metadata::{ColumnInfo, ForeignKeyRef};
use crate::sql::Dialect;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised by the execution layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// The engine rejected or failed the statement. Displays the engine's own text.
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The statement exceeded the configured time limit and was interrupted.
    #[error("query timed out after {0} seconds")]
    Timeout(u64),

    /// No engine is available for the configured driver.
    #[error("no query engine for driver '{0}'")]
    UnsupportedDriver(String),

    /// The connection pool stopped handing out connections.
    #[error("connection pool closed")]
    PoolClosed,

    /// The blocking worker task panicked or was cancelled.
    #[error("database task failed: {0}")]
    Task(String),
}

/// Column names and rows of a statement's result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Outcome of running generated SQL, as returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueryResult {
    #[serde(rename = "query_result")]
    Success {
        sql: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
    },
}

impl QueryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success { .. })
    }
}

/// A relational database the service can introspect and query.
#[async_trait]
pub trait Database: Send + Sync {
    /// The SQL dialect this engine speaks.
    fn dialect(&self) -> Dialect;

    /// Strip connection secrets from a message before it leaves the process.
    fn redact(&self, message: &str) -> String {
        message.to_string()
    }

    /// Names of user tables.
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Columns of a table in declaration order.
    async fn table_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Primary key columns of a table in key order.
    async fn primary_key(&self, table: &str) -> DbResult<Vec<String>>;

    /// Foreign keys declared on a table.
    async fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyRef>>;

    /// Run a statement and collect every row.
    async fn execute(&self, sql: &str) -> DbResult<RowSet>;

    /// `MAX(column)` over a table; `null` for an empty table.
    async fn max_value(&self, table: &str, column: &str) -> DbResult<Value> {
        let dialect = self.dialect();
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            dialect.quote_identifier(column),
            dialect.quote_identifier(table)
        );
        let result = self.execute(&sql).await?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(Value::Null))
    }
}

/// Run generated SQL and package the outcome.
///
/// Engine failures become [`QueryResult::Error`] carrying the engine's
/// message (with connection secrets removed) so the semantic layer author can
/// see exactly why the model's SQL was rejected.
pub async fn run_query(db: &dyn Database, sql: &str) -> QueryResult {
    match db.execute(sql).await {
        Ok(RowSet { columns, rows }) => {
            debug!(rows = rows.len(), "query succeeded");
            QueryResult::Success {
                sql: sql.to_string(),
                columns,
                rows,
            }
        }
        Err(e) => {
            debug!(error = %e, "query failed");
            QueryResult::Error {
                message: db.redact(&e.to_string()),
                sql: Some(sql.to_string()),
            }
        }
    }
}

/// Open the engine for the configured connection.
pub fn connect(settings: &DatabaseSettings) -> Result<Arc<dyn Database>, ConnectError> {
    let config = settings.connection()?;
    connect_with(&config, settings)
}

/// Open the engine for an explicit connection config.
pub fn connect_with(
    config: &ConnectionConfig,
    settings: &DatabaseSettings,
) -> Result<Arc<dyn Database>, ConnectError> {
    match config.driver {
        Driver::Sqlite => {
            let db = SqliteDatabase::open(
                config.clone(),
                settings.pool.max_open_conns,
                Duration::from_secs(settings.query_timeout_secs),
            )?;
            Ok(Arc::new(db))
        }
        other => Err(ConnectError::Db(DbError::UnsupportedDriver(
            other.scheme().to_string(),
        ))),
    }
}

/// Errors opening a database.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] crate::config::ConnectionError),

    #[error(transparent)]
    Db(#[from] DbError),
}
