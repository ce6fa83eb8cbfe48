use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Multi-step conversation a chat can be in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// `/connect` was issued; the next plain message is treated as the
    /// private key.
    AwaitingPrivateKey,
}

/// Per-chat conversation state, shared by all router clones.
#[derive(Clone, Default)]
pub struct DialogRegistry {
    states: Arc<RwLock<HashMap<i64, ConversationState>>>,
}

impl DialogRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat_id: i64) -> Option<ConversationState> {
        self.states.read().await.get(&chat_id).copied()
    }

    pub async fn set(&self, chat_id: i64, state: ConversationState) {
        self.states.write().await.insert(chat_id, state);
    }

    /// Ends any pending dialog. Returns whether one was pending.
    pub async fn clear(&self, chat_id: i64) -> bool {
        self.states.write().await.remove(&chat_id).is_some()
    }
}
