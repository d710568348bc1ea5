use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::db::{ActivityLog, WalletStore};
use crate::error::Result;

const MEMORY_URL: &str = "sqlite::memory:";

/// Database manager for handling SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database and make sure the schema exists.
    ///
    /// Accepts `sqlite:` URLs, `sqlite::memory:` or a bare file path.
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url == MEMORY_URL || database_url == ":memory:";
        let options = (if in_memory {
            SqliteConnectOptions::from_str(MEMORY_URL)?
        } else if database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database_url)?.create_if_missing(true)
        } else {
            SqliteConnectOptions::new()
                .filename(database_url)
                .create_if_missing(true)
        })
        .busy_timeout(Duration::from_secs(5));

        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        let db = Self { pool };
        db.init_schema().await?;
        info!("Database ready at {}", database_url);

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS wallets (
                user_id TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                private_key TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS activity (
                chat_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                username TEXT,
                last_active INTEGER NOT NULL,
                is_bot BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (chat_id, user_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_activity_last_active ON activity (chat_id, last_active)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn wallets(&self) -> WalletStore {
        WalletStore::new(self.pool.clone())
    }

    pub fn activity(&self) -> ActivityLog {
        ActivityLog::new(self.pool.clone())
    }
}

/// Initialize an in-memory database for testing
#[cfg(test)]
pub async fn init_test_db() -> Result<Database> {
    Database::new(MEMORY_URL).await
}
