use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::SimpleAsyncConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{ReminderChainError, Result};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";

pub type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
pub type SqlitePool = Pool<SqliteAsyncConn>;
pub type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

/// Shared persistence handle for both the reminder table and the alarm ledger.
///
/// Opened once at process start and cloned into every component that needs
/// storage; clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: String,
}

impl Database {
    pub async fn open(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| ReminderChainError::StorageUnavailable(e.to_string()))?;
        tracing::debug!(path = sqlite_path, "Opened reminder database");
        Ok(Self {
            pool,
            path: sqlite_path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ReminderChainError::StorageUnavailable(e.to_string()))?;
        conn.batch_execute(CONNECTION_PRAGMAS)
            .await
            .map_err(|e| ReminderChainError::StorageUnavailable(e.to_string()))?;
        Ok(conn)
    }
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ReminderChainError::StorageUnavailable(e.to_string()))?;
    }
    Ok(())
}

pub fn open_connection_sync(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .map_err(|e| ReminderChainError::StorageUnavailable(e.to_string()))?;
    conn.batch_execute(CONNECTION_PRAGMAS)
        .map_err(|e| ReminderChainError::StorageUnavailable(e.to_string()))?;
    Ok(conn)
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = open_connection_sync(&database_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| ReminderChainError::StorageUnavailable(e.to_string()))?;
        Ok::<_, ReminderChainError>(())
    })
    .await
    .map_err(|e| ReminderChainError::Runtime(e.to_string()))??;
    Ok(())
}
