//! `SQLite` adapter for the progress and catalog repositories.
//!
//! One pool serves both traits. Connections run in WAL mode with a busy
//! timeout so tracker writes and dashboard reads can overlap.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tracing::debug;

use crate::repository::{CatalogRepository, ProgressRepository, Storage};

mod catalog_repo;
mod mapping;
mod migrate;
mod progress_repo;

/// Connection pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteOptions {
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect with [`SqliteOptions::default`].
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the pool cannot be opened.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, SqliteOptions::default()).await
    }

    /// Open a pool against `database_url`.
    ///
    /// Plain `sqlite::memory:` databases are private to one connection, so
    /// use `max_connections = 1` or a shared-cache URL for them.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the pool cannot be opened or a connection
    /// pragma fails.
    pub async fn connect_with(
        database_url: &str,
        options: SqliteOptions,
    ) -> Result<Self, SqliteInitError> {
        let busy_ms = options.busy_timeout.as_millis();
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .acquire_timeout(options.acquire_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query(&format!("PRAGMA busy_timeout = {busy_ms};"))
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        debug!(
            database_url,
            max_connections = options.max_connections,
            "opened sqlite pool"
        );
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration statement fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }

    fn into_storage(self) -> Storage {
        let progress: Arc<dyn ProgressRepository> = Arc::new(self.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(self);
        Storage { progress, catalog }
    }
}

impl Storage {
    /// Migrated `SQLite` storage with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connecting or migrating fails.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::sqlite_with(database_url, SqliteOptions::default()).await
    }

    /// Migrated `SQLite` storage with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connecting or migrating fails.
    pub async fn sqlite_with(
        database_url: &str,
        options: SqliteOptions,
    ) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect_with(database_url, options).await?;
        repo.migrate().await?;
        Ok(repo.into_storage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }

    #[test]
    fn pool_size_never_drops_to_zero() {
        let options = SqliteOptions::default().with_max_connections(0);
        assert_eq!(options.max_connections, 1);
    }

    #[tokio::test]
    async fn single_connection_memory_database_keeps_schema() {
        let options = SqliteOptions::default().with_max_connections(1);
        let storage = Storage::sqlite_with("sqlite::memory:", options).await.unwrap();
        let found = storage
            .progress
            .get_progress(
                &progress_core::model::UserId::new("u1"),
                &progress_core::model::VideoId::new("v1"),
            )
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
