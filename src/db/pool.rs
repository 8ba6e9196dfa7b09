//! A small bounded pool of SQLite connections.
//!
//! Checkout waits on a semaphore sized to `max_open_conns`; idle connections
//! are reused and opened lazily. A checked-out connection returns itself to
//! the pool on drop, including when the blocking task using it is abandoned
//! after a timeout.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{DbError, DbResult};

/// How long SQLite waits on a locked database before reporting `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where pool connections point.
#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    /// A private in-memory database. Only one connection ever exists, since a
    /// second `:memory:` connection would see a different, empty database.
    Memory,
}

/// Bounded pool of SQLite connections.
pub struct ConnectionPool {
    target: Target,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    /// Pool over a database file, at most `max_open` connections at once.
    pub fn file(path: impl Into<PathBuf>, max_open: u32) -> Arc<Self> {
        Self::build(Target::File(path.into()), max_open.max(1) as usize)
    }

    /// Single-connection pool over a private in-memory database.
    pub fn memory() -> Arc<Self> {
        Self::build(Target::Memory, 1)
    }

    fn build(target: Target, size: usize) -> Arc<Self> {
        Arc::new(Self {
            target,
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Arc::new(Semaphore::new(size)),
        })
    }

    /// Wait for a free slot and hand out a connection.
    pub async fn checkout(self: &Arc<Self>) -> DbResult<PooledConnection> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DbError::PoolClosed)?;

        let reused = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let conn = match reused {
            Some(conn) => conn,
            None => self.open()?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Connections currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn open(&self) -> DbResult<Connection> {
        let conn = match &self.target {
            Target::File(path) => {
                debug!(path = %path.display(), "opening sqlite connection");
                Connection::open(path)?
            }
            Target::Memory => Connection::open_in_memory()?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn give_back(&self, conn: Connection) {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(conn);
    }
}

/// A connection checked out of a [`ConnectionPool`].
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
    // Released after `conn` is handed back (fields drop after `Drop::drop`).
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `Drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}
