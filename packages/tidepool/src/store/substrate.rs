//! Durable substrate for serialized conversation logs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

/// Whole-value persistence for conversation logs, one value per session.
///
/// `save` must commit atomically: a reader racing a writer sees the
/// previous log or the new one, never a torn state. The store above this
/// trait relies on that to skip read locks entirely.
#[async_trait]
pub trait TurnStorage: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<String>>;
    async fn save(&self, session_id: &str, turns_json: &str) -> Result<()>;
}

/// SQLite-backed storage; one row per session, replaced in a single
/// UPSERT statement.
pub struct SqliteTurnStorage {
    pool: SqlitePool,
}

impl SqliteTurnStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TurnStorage for SqliteTurnStorage {
    async fn load(&self, session_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT turns FROM conversations WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load conversation log")?;
        Ok(row.map(|(turns,)| turns))
    }

    async fn save(&self, session_id: &str, turns_json: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (session_id, turns, updated_at)
            VALUES (?, ?, unixepoch())
            ON CONFLICT(session_id) DO UPDATE SET
                turns = excluded.turns,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(turns_json)
        .execute(&self.pool)
        .await
        .context("Failed to save conversation log")?;
        Ok(())
    }
}

/// In-memory substrate for tests. Same whole-value semantics as the
/// SQLite implementation, minus the disk.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryTurnStorage {
    map: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
#[async_trait]
impl TurnStorage for MemoryTurnStorage {
    async fn load(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, turns_json: &str) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(session_id.to_string(), turns_json.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn load_of_an_unknown_session_is_none() {
        let storage = SqliteTurnStorage::new(test_pool().await);
        assert_eq!(storage.load("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let storage = SqliteTurnStorage::new(test_pool().await);
        storage.save("tidepool", r#"[{"x":1}]"#).await.unwrap();
        assert_eq!(
            storage.load("tidepool").await.unwrap().as_deref(),
            Some(r#"[{"x":1}]"#)
        );
    }

    #[tokio::test]
    async fn save_replaces_the_previous_value() {
        let storage = SqliteTurnStorage::new(test_pool().await);
        storage.save("tidepool", "[1]").await.unwrap();
        storage.save("tidepool", "[1,2]").await.unwrap();
        assert_eq!(
            storage.load("tidepool").await.unwrap().as_deref(),
            Some("[1,2]")
        );
    }

    #[tokio::test]
    async fn sessions_do_not_bleed_into_each_other() {
        let storage = SqliteTurnStorage::new(test_pool().await);
        storage.save("reef", "[1]").await.unwrap();
        storage.save("shoal", "[2]").await.unwrap();
        assert_eq!(storage.load("reef").await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(storage.load("shoal").await.unwrap().as_deref(), Some("[2]"));
    }
}
