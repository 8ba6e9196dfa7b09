//! Schema introspection over a [`Database`].
//!
//! Tables are described concurrently. A failure on one table never aborts
//! the scan: a table whose columns cannot be read is left out, and a table
//! whose keys cannot be read is reported without them. Only a failure to
//! enumerate tables fails the whole call.

use futures::future::join_all;
use tracing::warn;

use super::types::{SchemaDescription, TableSchema};
use crate::db::{Database, DbResult};

/// Describe every table of the live database. Read-only.
pub async fn introspect(db: &dyn Database) -> DbResult<SchemaDescription> {
    let tables = db.list_tables().await?;

    let described = join_all(tables.iter().map(|table| describe_table(db, table))).await;

    let tables = tables
        .into_iter()
        .zip(described)
        .filter_map(|(name, schema)| schema.map(|s| (name, s)))
        .collect();

    Ok(SchemaDescription { tables })
}

async fn describe_table(db: &dyn Database, table: &str) -> Option<TableSchema> {
    let columns = match db.table_columns(table).await {
        Ok(columns) => columns,
        Err(e) => {
            warn!(table, error = %e, "skipping table: columns unavailable");
            return None;
        }
    };

    let primary_key = db.primary_key(table).await.unwrap_or_else(|e| {
        warn!(table, error = %e, "primary key unavailable");
        Vec::new()
    });

    let foreign_keys = db.foreign_keys(table).await.unwrap_or_else(|e| {
        warn!(table, error = %e, "foreign keys unavailable");
        Vec::new()
    });

    Some(TableSchema {
        columns,
        primary_key,
        foreign_keys,
    })
}
