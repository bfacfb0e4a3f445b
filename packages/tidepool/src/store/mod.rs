//! Per-session conversation logs with a bounded retention window.

mod substrate;
#[cfg(test)]
pub(crate) mod test_helpers;

pub use substrate::{SqliteTurnStorage, TurnStorage};

#[cfg(test)]
pub(crate) use substrate::MemoryTurnStorage;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Turns retained per session; the oldest fall off first beyond this.
pub const MAX_TURNS: usize = 20;

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in a conversation. Immutable once appended;
/// insertion order is the only order, the timestamp is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Bounded per-session turn log over a pluggable substrate.
///
/// Writers for the same session are serialized by a per-session mutex
/// held across the whole read-modify-write, so interleaved appends can
/// never lose turns or overshoot the retention bound. Reads take no lock:
/// the substrate commits whole values, so a reader racing a writer sees
/// the previous log or the new one.
pub struct ConversationStore {
    storage: Arc<dyn TurnStorage>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationStore {
    pub fn new(storage: Arc<dyn TurnStorage>) -> Self {
        Self {
            storage,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(session_id.to_string()).or_default().clone()
    }

    /// Current log for a session, oldest first. Empty when none exists.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        match self.storage.load(session_id).await? {
            Some(json) => {
                serde_json::from_str(&json).context("Stored conversation log is not valid JSON")
            }
            None => Ok(Vec::new()),
        }
    }

    /// Append one turn, truncate to the newest [`MAX_TURNS`] entries, and
    /// commit the whole log in one write.
    pub async fn append(&self, session_id: &str, turn: Turn) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut turns = self.history(session_id).await?;
        turns.push(turn);
        if turns.len() > MAX_TURNS {
            turns.drain(..turns.len() - MAX_TURNS);
        }
        let json = serde_json::to_string(&turns).context("Failed to serialize conversation log")?;
        self.storage.save(session_id, &json).await
    }

    /// Reset the log to empty. Idempotent; clearing a session that never
    /// existed succeeds.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;
        self.storage.save(session_id, "[]").await
    }
}
