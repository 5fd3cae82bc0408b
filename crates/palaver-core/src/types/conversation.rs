//! Conversation, message and feedback model.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{RequestContext, ToolCallRecord};

const MAX_ID_LENGTH: usize = 255;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][-a-zA-Z0-9]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").expect("valid pattern")
    })
}

/// Check that an identifier is safe for use as a path component.
/// Rejects empty, over-long and path-traversal-capable values.
pub fn validate_id(id: &str) -> Result<(), EngineError> {
    if id.is_empty() || id.len() > MAX_ID_LENGTH || !id_pattern().is_match(id) {
        return Err(EngineError::validation(
            "invalid-id",
            format!("identifier '{id}' is not a safe id"),
        ));
    }
    Ok(())
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    /// Plain text for user turns; the serialized response JSON for
    /// assistant turns.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            skill_id: None,
            variant: None,
            tool_calls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: content.into(),
            skill_id: None,
            variant: None,
            tool_calls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_skill(mut self, skill_id: impl Into<String>, variant: Option<String>) -> Self {
        self.skill_id = Some(skill_id.into());
        self.variant = variant;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// A chat conversation. Messages are append-only within the engine and
/// `updated_at` is monotonically non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(entity_id: Option<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), entity_id)
    }

    pub fn with_id(id: impl Into<String>, entity_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            entity_id,
            context: RequestContext::default(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and advance `updated_at` without ever moving it
    /// backwards.
    pub fn push_message(&mut self, message: Message) {
        let stamp = message.created_at.max(self.updated_at);
        self.messages.push(message);
        self.updated_at = stamp.max(Utc::now()).max(self.updated_at);
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The most recent `limit` messages, oldest first.
    pub fn recent_messages(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

/// User feedback on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub conversation_id: String,
    pub message_id: String,
    /// Feedback score: 1-5, or -1/1 for thumbs down/up.
    pub rating: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<FeedbackSnapshot>,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        rating: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            rating,
            comment: None,
            snapshot: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: FeedbackSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// Snapshot of the exchange a feedback entry rates, kept for off-line
/// per-variant conversion analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSnapshot {
    pub user_message: String,
    pub assistant_response: String,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}
