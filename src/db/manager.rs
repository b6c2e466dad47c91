//! Database connection management
//!
//! SQLite connection pool using r2d2, with an async wrapper that keeps
//! blocking database work off the tokio runtime. A connection is checked out
//! of the pool per operation and returned when the closure finishes, on every
//! exit path.

use crate::core::error::{ExportError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;

/// Database handle with connection pool
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the specified path and apply the schema
    pub fn new(db_path: &Path, pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExportError::InitializationError(format!(
                    "Failed to create database directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(busy_timeout)?;
            // WAL keeps concurrent readers from blocking each other
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(30))
            .build(manager)?;

        let db = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };

        db.migrate()?;

        Ok(db)
    }

    /// Create a Database backed by an in-memory SQLite instance, for tests
    pub fn new_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        // An in-memory database exists per connection, so the pool must not
        // grow past one
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(Duration::from_secs(30))
            .build(manager)?;

        let db = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };

        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Execute a database operation asynchronously
    ///
    /// Wraps the synchronous closure in `tokio::task::spawn_blocking` so the
    /// async runtime is never blocked on SQLite.
    pub async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| ExportError::TaskError(format!("Database task panicked: {}", e)))?
    }

    /// Apply pending schema migrations
    pub fn migrate(&self) -> Result<()> {
        let conn = self.get_connection()?;
        crate::db::migrations::run_migrations(&conn)
    }

    /// Get the database file path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get the configured pool size
    pub fn pool_size(&self) -> u32 {
        self.pool.max_size()
    }

    /// Get the number of idle connections in the pool
    pub fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }

    /// Get the number of active connections in the pool
    pub fn active_connections(&self) -> u32 {
        self.pool.state().connections - self.pool.state().idle_connections
    }
}
