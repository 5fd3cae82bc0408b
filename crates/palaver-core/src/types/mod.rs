//! Shared engine types.
//!
//! Request/result shapes for a chat turn, plus the skill and conversation
//! data model. These types are the stable contract between the engine, the
//! transports above it, and the stores below it.

mod conversation;
mod skill;

pub use conversation::{
    validate_id, Conversation, Feedback, FeedbackSnapshot, Message, Role,
};
pub use skill::{OutputSchema, PropertySchema, SchemaProperty, Skill, SkillExample, SkillVariant};

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the engine produces a reply for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Deterministic data fetching with a single LM call. The expert's
    /// fetcher controls what data is fetched.
    Expert,
    /// The LM decides which tools to call via function calling; multiple
    /// LM calls may occur.
    Agentic,
}

/// Per-request context map from the app layer (market, locale, userId, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext(pub HashMap<String, Value>);

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String value with a default.
    pub fn string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }

    /// Integer value with a default.
    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        self.0.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// Boolean value with a default.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }
}

impl From<HashMap<String, Value>> for RequestContext {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

/// An incoming chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's question or input.
    pub message: String,
    /// Links this turn to an existing conversation. Empty means a new
    /// conversation is created.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Opaque identifier for the entity being discussed (product id,
    /// user id, ...); forwarded to fetchers and experts.
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub context: RequestContext,
    /// Overrides the engine's default execution mode for this turn.
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
    /// Forces routing to a specific skill (bypasses the router).
    #[serde(default)]
    pub skill_id: Option<String>,
    /// Forces a specific A/B variant.
    #[serde(default)]
    pub variant: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            entity_id: None,
            context: RequestContext::default(),
            mode: None,
            skill_id: None,
            variant: None,
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_skill_id(mut self, id: impl Into<String>) -> Self {
        self.skill_id = Some(id.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

/// The structured result of a processed chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    pub conversation_id: String,
    pub message_id: String,
    pub skill_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Typed JSON response matching the skill's output schema. Null when
    /// the turn short-circuited into a suggested action.
    pub response: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<SuggestedAction>,
    #[serde(default)]
    pub usage: TokenUsage,
    /// Wall-clock processing time, milliseconds on the wire.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

/// A recorded tool invocation, attached to the assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

/// An action the LM wants to perform that requires user confirmation.
/// Surfaced instead of executing; never executed by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAction {
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Token consumption, accumulated across the LM calls of one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_context_typed_accessors_with_defaults() {
        let mut ctx = RequestContext::new();
        ctx.insert("market", json!("SE"));
        ctx.insert("limit", json!(5));
        ctx.insert("debug", json!(true));

        assert_eq!(ctx.string_or("market", "US"), "SE");
        assert_eq!(ctx.string_or("locale", "en"), "en");
        assert_eq!(ctx.int_or("limit", 10), 5);
        assert_eq!(ctx.int_or("offset", 10), 10);
        assert!(ctx.bool_or("debug", false));
        assert!(!ctx.bool_or("verbose", false));
    }

    #[test]
    fn test_chat_request_deserializes_camel_case_body() {
        let body = json!({
            "message": "tell me about the product",
            "conversationId": "conv-1",
            "entityId": "prod-42",
            "mode": "agentic",
            "skillId": "product",
            "variant": "B"
        });
        let req: ChatRequest = serde_json::from_value(body).expect("deserialize");
        assert_eq!(req.message, "tell me about the product");
        assert_eq!(req.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(req.entity_id.as_deref(), Some("prod-42"));
        assert_eq!(req.mode, Some(ExecutionMode::Agentic));
        assert_eq!(req.skill_id.as_deref(), Some("product"));
        assert_eq!(req.variant.as_deref(), Some("B"));
    }

    #[test]
    fn test_chat_result_serializes_duration_as_millis() {
        let result = ChatResult {
            conversation_id: "c".to_string(),
            message_id: "m".to_string(),
            skill_id: "s".to_string(),
            variant: None,
            mode: ExecutionMode::Expert,
            tool_calls: Vec::new(),
            response: json!({"answer": "ok"}),
            suggested_action: None,
            usage: TokenUsage::default(),
            duration: Duration::from_millis(1250),
        };
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["duration"], json!(1250));
        assert_eq!(value["mode"], json!("expert"));
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        total.add(TokenUsage {
            prompt_tokens: 7,
            completion_tokens: 3,
            total_tokens: 10,
        });
        assert_eq!(total.prompt_tokens, 17);
        assert_eq!(total.completion_tokens, 8);
        assert_eq!(total.total_tokens, 25);
    }
}
