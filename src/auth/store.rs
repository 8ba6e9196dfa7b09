//! SQLite-backed user credential store.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{AuthError, AuthResult};

/// A registered user.
#[derive(Clone, PartialEq)]
pub struct UserRecord {
    /// Normalised (trimmed, lower-cased) username.
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password_hash", &"***")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Persistent user table.
///
/// One connection behind a mutex; every call runs on the blocking pool.
#[derive(Clone)]
pub struct UserStore {
    conn: Arc<Mutex<Connection>>,
}

impl UserStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AuthError::Config(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> AuthResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> AuthResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    async fn run<T, F>(&self, f: F) -> AuthResult<T>
    where
        F: FnOnce(&Connection) -> AuthResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| AuthError::Task(e.to_string()))?
    }

    /// Insert a user. Fails with `Conflict` if the username is taken.
    pub async fn insert(&self, record: UserRecord) -> AuthResult<()> {
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
                params![
                    record.username,
                    record.password_hash,
                    record.created_at.to_rfc3339()
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(AuthError::Conflict)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Look a user up by normalised username.
    pub async fn find(&self, username: &str) -> AuthResult<Option<UserRecord>> {
        let username = username.to_string();
        self.run(move |conn| {
            let record = conn
                .query_row(
                    "SELECT username, password_hash, created_at FROM users WHERE username = ?1",
                    params![username],
                    |row| {
                        let created_at: String = row.get(2)?;
                        let created_at = DateTime::parse_from_rfc3339(&created_at)
                            .map(|t| t.with_timezone(&Utc))
                            .map_err(|e| {
                                rusqlite::Error::FromSqlConversionFailure(
                                    2,
                                    rusqlite::types::Type::Text,
                                    Box::new(e),
                                )
                            })?;
                        Ok(UserRecord {
                            username: row.get(0)?,
                            password_hash: row.get(1)?,
                            created_at,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }
}
