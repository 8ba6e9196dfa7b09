//! Data freshness: the latest value of a timestamp-like column per table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{Database, DbResult};
use crate::metadata::ColumnInfo;

/// Column names treated as load/update timestamps, matched case-insensitively.
pub const TIMESTAMP_CANDIDATES: &[&str] = &[
    "updated_at",
    "modified_at",
    "created_at",
    "ingested_at",
    "_load_ts",
    "_ingested_ts",
    "_updated_at",
    "timestamp",
    "ts",
];

/// Freshness of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessEntry {
    pub table: String,
    /// The detected timestamp column, if any.
    pub timestamp_column: Option<String>,
    /// `MAX(timestamp_column)`, or null when undetected, empty or unreadable.
    pub last_loaded: Option<Value>,
}

/// The first column (in declaration order) whose name is a timestamp candidate.
pub fn timestamp_column(columns: &[ColumnInfo]) -> Option<&str> {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .find(|name| TIMESTAMP_CANDIDATES.contains(&name.to_lowercase().as_str()))
}

/// Estimate freshness for every table.
///
/// Each table is probed independently; a failure on one table yields
/// `last_loaded: null` for it and the scan continues.
pub async fn compute_freshness(db: &dyn Database) -> DbResult<Vec<FreshnessEntry>> {
    let tables = db.list_tables().await?;
    let mut entries = Vec::with_capacity(tables.len());

    for table in tables {
        let probe = probe_table(db, &table).await;
        entries.push(match probe {
            Ok((timestamp_column, last_loaded)) => FreshnessEntry {
                table,
                timestamp_column,
                last_loaded: last_loaded.filter(|v| !v.is_null()),
            },
            Err((timestamp_column, e)) => {
                warn!(table = %table, error = %e, "freshness probe failed");
                FreshnessEntry {
                    table,
                    timestamp_column,
                    last_loaded: None,
                }
            }
        });
    }

    Ok(entries)
}

type Probe = (Option<String>, Option<Value>);

async fn probe_table(
    db: &dyn Database,
    table: &str,
) -> Result<Probe, (Option<String>, super::DbError)> {
    let columns = db.table_columns(table).await.map_err(|e| (None, e))?;
    let Some(column) = timestamp_column(&columns).map(str::to_string) else {
        return Ok((None, None));
    };

    match db.max_value(table, &column).await {
        Ok(value) => Ok((Some(column), Some(value))),
        Err(e) => Err((Some(column), e)),
    }
}
