//! SQLite database connection and schema management.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::TidepoolConfig;

/// Bump when the schema changes. Version 1: the conversations table.
const SCHEMA_VERSION: i64 = 1;

/// Shared handle to the conversation database.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &TidepoolConfig) -> Result<Self> {
        let url = config.db_url();
        info!("Opening conversation database at {}", config.db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect(&url)
            .await
            .with_context(|| format!("Failed to open database at {url}"))?;

        // WAL keeps readers unblocked while the relay commits logs.
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        run_migrations(&pool).await?;

        Ok(Self { pool })
    }
}

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL DEFAULT (unixepoch())
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create schema_version table")?;

    let current: Option<(i64,)> =
        sqlx::query_as("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await
            .context("Failed to read schema version")?;
    let current = current.map(|(version,)| version).unwrap_or(0);

    if current > SCHEMA_VERSION {
        anyhow::bail!(
            "Database schema version {current} is newer than this build supports ({SCHEMA_VERSION}); refusing to touch it"
        );
    }
    if current == SCHEMA_VERSION {
        return Ok(());
    }

    // One serialized log per session, committed whole.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            session_id TEXT PRIMARY KEY,
            turns TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (unixepoch())
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create conversations table")?;

    sqlx::query("INSERT OR REPLACE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await
        .context("Failed to record schema version")?;

    info!("Database migrated to schema version {}", SCHEMA_VERSION);
    Ok(())
}

/// In-memory pool with the schema applied, for tests.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_the_conversations_table() {
        let pool = test_pool().await;
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn schema_version_is_recorded() {
        let pool = test_pool().await;
        let version: (i64,) =
            sqlx::query_as("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(version.0, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn newer_schema_version_is_refused() {
        let pool = test_pool().await;
        sqlx::query("INSERT OR REPLACE INTO schema_version (version) VALUES (999)")
            .execute(&pool)
            .await
            .unwrap();
        let err = run_migrations(&pool).await.unwrap_err();
        assert!(err.to_string().contains("newer"));
    }
}
