//! Shared fixtures for store and relay tests.

use std::sync::Arc;

use super::ConversationStore;
use super::substrate::MemoryTurnStorage;

/// Conversation store over a fresh in-memory substrate.
pub(crate) fn memory_store() -> ConversationStore {
    ConversationStore::new(Arc::new(MemoryTurnStorage::default()))
}
