//! Database connection and migration management.
//!
//! Provides the SQLite connection pool backing every repository in the crate.
//! The schema covers tasks, thoughts, the graph store, service correlations,
//! and the signed audit chain (see `migrations/`).

use crate::error::{CirisError, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Type alias for the database connection pool.
pub type DatabasePool = SqlitePool;

/// Database connection wrapper shared across repositories via `Arc`.
#[derive(Clone, Debug)]
pub struct Database {
    pub(crate) pool: Arc<DatabasePool>,
}

impl Database {
    /// Open (creating if necessary) a SQLite database at `database_path`.
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let path = database_path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| CirisError::Database("invalid database path".to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CirisError::Database(format!("failed to create database directory: {}", e))
                })?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", path_str);
        debug!(url = %database_url, "connecting to database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .map_err(|e| CirisError::Database(format!("failed to connect to database: {}", e)))?;

        info!(path = %path.display(), "database connection established");

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Reference to the underlying connection pool.
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Run embedded migrations (`./migrations`) against the pool.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("running database migrations");

        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| CirisError::Database(format!("migration failed: {}", e)))?;

        info!("database migrations completed");
        Ok(())
    }

    /// Run a trivial query to confirm the pool is responsive.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| CirisError::Database(format!("health check failed: {}", e)))?;
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("database connection closed");
    }

    /// Open a database and apply migrations in one step.
    pub async fn initialize<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let db = Self::new(database_path).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database with migrations applied, for tests.
    pub async fn test_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CirisError::Database(format!("failed to connect to in-memory database: {}", e))
            })?;

        let db = Self { pool: Arc::new(pool) };
        db.run_migrations().await?;
        Ok(db)
    }
}
