//! In-memory conversation store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use palaver_core::store::{ConversationStore, StoreError};
use palaver_core::types::{Conversation, Feedback, Message};

use crate::check_id;

/// Reference implementation for development and testing. Conversations
/// are lost on restart. `get` returns a deep copy so callers never
/// observe mid-append state.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    feedback: RwLock<Vec<Feedback>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded feedback, in submission order.
    pub fn all_feedback(&self) -> Vec<Feedback> {
        self.feedback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, entity_id: Option<String>) -> Result<Conversation, StoreError> {
        if let Some(entity_id) = &entity_id {
            check_id(entity_id)?;
        }
        let conversation = Conversation::new(entity_id);
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        conversations.insert(conversation.id.clone(), conversation.clone());
        debug!(conversation_id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    async fn get(&self, id: &str) -> Result<Conversation, StoreError> {
        check_id(id)?;
        let conversations = self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        conversations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: Message,
    ) -> Result<(), StoreError> {
        check_id(conversation_id)?;
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        conversation.push_message(message);
        Ok(())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        check_id(&conversation.id)?;
        let mut stored = conversation.clone();
        stored.updated_at = stored.updated_at.max(Utc::now());
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        conversations.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn save_feedback(&self, feedback: Feedback) -> Result<(), StoreError> {
        let mut entries = self
            .feedback
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // One feedback entry per message; later submissions replace
        // earlier ones.
        entries.retain(|f| f.message_id != feedback.message_id);
        entries.push(feedback);
        Ok(())
    }
}
