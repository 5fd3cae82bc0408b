//! Conversation store contract.
//!
//! The orchestrator depends on exactly these five operations. In-memory
//! and file-backed implementations live in `palaver-stores`; relational
//! backends are expected to sit behind the same trait. The engine assumes
//! nothing beyond "append_message is durable before it returns ok".

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Conversation, Feedback, Message};

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Conversation persistence contract.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a new conversation with a store-assigned id.
    async fn create(&self, entity_id: Option<String>) -> Result<Conversation, StoreError>;

    /// Fetch a conversation. The returned value is an owned copy; mutating
    /// it never mutates the store.
    async fn get(&self, id: &str) -> Result<Conversation, StoreError>;

    /// Append one message atomically. Durable before returning ok.
    async fn append_message(&self, conversation_id: &str, message: Message)
        -> Result<(), StoreError>;

    /// Upsert a whole conversation.
    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// Record feedback for a message.
    async fn save_feedback(&self, feedback: Feedback) -> Result<(), StoreError>;
}
