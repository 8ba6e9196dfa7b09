//! SQLite engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use super::pool::ConnectionPool;
use super::{Database, DbError, DbResult, RowSet};
use crate::config::ConnectionConfig;
use crate::metadata::{ColumnInfo, ForeignKeyRef};
use crate::sql::Dialect;

/// SQLite-backed [`Database`].
///
/// Every call checks a connection out of the pool and runs on the blocking
/// thread pool under the statement timeout. On timeout the running statement
/// is interrupted so the connection comes back promptly.
pub struct SqliteDatabase {
    pool: Arc<ConnectionPool>,
    timeout: Duration,
    config: ConnectionConfig,
}

impl SqliteDatabase {
    /// Open a pooled SQLite database described by `config`.
    pub fn open(config: ConnectionConfig, max_open: u32, timeout: Duration) -> DbResult<Self> {
        let pool = if config.is_in_memory() {
            ConnectionPool::memory()
        } else {
            ConnectionPool::file(&config.host, max_open)
        };
        debug!(url = %config, "sqlite database configured");

        Ok(Self {
            pool,
            timeout,
            config,
        })
    }

    /// A private in-memory database.
    pub fn in_memory(timeout: Duration) -> Self {
        Self {
            pool: ConnectionPool::memory(),
            timeout,
            config: ConnectionConfig::sqlite(":memory:"),
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Run `f` on a pooled connection on the blocking thread pool.
    pub async fn with_connection<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.checkout().await?;
        let interrupt = conn.get_interrupt_handle();
        let task = tokio::task::spawn_blocking(move || f(&conn));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(DbError::from),
            Ok(Err(join)) => Err(DbError::Task(join.to_string())),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "statement timed out; interrupting");
                interrupt.interrupt();
                Err(DbError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn redact(&self, message: &str) -> String {
        self.config.redact(message)
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )?;
            let names = stmt.query_map([], |row| row.get(0))?;
            names.collect()
        })
        .await
    }

    async fn table_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            let mut stmt =
                conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
            let columns = stmt.query_map(params![table], |row| {
                Ok(ColumnInfo::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            columns.collect()
        })
        .await
    }

    async fn primary_key(&self, table: &str) -> DbResult<Vec<String>> {
        let table = table.to_string();
        self.with_connection(move |conn| primary_key_columns(conn, &table))
            .await
    }

    async fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyRef>> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, \"table\", \"from\", \"to\" \
                 FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
            )?;
            let rows = stmt.query_map(params![table], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?;

            let mut keys: Vec<(i64, ForeignKeyRef)> = Vec::new();
            let mut implicit_targets = Vec::new();
            for row in rows {
                let (id, referred_table, from, to) = row?;
                match keys.last_mut() {
                    Some((last_id, fk)) if *last_id == id => {
                        fk.constrained_columns.push(from);
                        fk.referred_columns.extend(to.clone());
                    }
                    _ => keys.push((
                        id,
                        ForeignKeyRef {
                            constrained_columns: vec![from],
                            referred_table,
                            referred_columns: to.clone().into_iter().collect(),
                        },
                    )),
                }
                if to.is_none() {
                    implicit_targets.push(keys.len() - 1);
                }
            }

            // `REFERENCES parent` without columns targets the parent's primary key.
            implicit_targets.dedup();
            for idx in implicit_targets {
                let fk = &mut keys[idx].1;
                fk.referred_columns = primary_key_columns(conn, &fk.referred_table)?;
            }

            Ok(keys.into_iter().map(|(_, fk)| fk).collect())
        })
        .await
    }

    async fn execute(&self, sql: &str) -> DbResult<RowSet> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();

            let mut rows = Vec::new();
            let mut cursor = stmt.query([])?;
            while let Some(row) = cursor.next()? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(to_json(row.get_ref(i)?));
                }
                rows.push(values);
            }

            Ok(RowSet { columns, rows })
        })
        .await
    }
}

fn primary_key_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
    let names = stmt.query_map(params![table], |row| row.get(0))?;
    names.collect()
}

/// Map a SQLite value onto JSON. Blobs become base64 text; non-finite reals become null.
fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}
