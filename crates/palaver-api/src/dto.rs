//! Request/response bodies and stream events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use palaver_core::types::{ChatResult, Skill, SuggestedAction};

/// `POST /feedback` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub conversation_id: String,
    pub message_id: String,
    pub rating: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// One entry of the `GET /skills` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    pub id: String,
    pub name: String,
    pub triggers: Vec<String>,
    pub intents: Vec<String>,
}

impl From<&Skill> for SkillSummary {
    fn from(skill: &Skill) -> Self {
        Self {
            id: skill.id.clone(),
            name: skill.name.clone(),
            triggers: skill.triggers.clone(),
            intents: skill.intents.clone(),
        }
    }
}

/// Events emitted on `POST /chat/stream` (`text/event-stream`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    /// The request was routed; emitted once, first.
    Routing {
        #[serde(rename = "skillId")]
        skill_id: String,
    },
    /// The engine is waiting on the LM or a tool.
    Thinking { detail: Option<String> },
    /// A content delta.
    Content { delta: String },
    /// Terminal event carrying the full result.
    Done {
        result: Box<ChatResult>,
        #[serde(
            rename = "suggestedAction",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        suggested_action: Option<SuggestedAction>,
    },
    /// Terminal error event.
    Error { error: String, code: String },
}

impl StreamEvent {
    /// Render as a `text/event-stream` frame.
    pub fn to_sse_frame(&self) -> String {
        let name = match self {
            Self::Routing { .. } => "routing",
            Self::Thinking { .. } => "thinking",
            Self::Content { .. } => "content",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        };
        let data = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("data").cloned())
            .unwrap_or(Value::Null);
        format!("event: {name}\ndata: {data}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::types::{ExecutionMode, TokenUsage};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_skill_summary_carries_routing_fields_only() {
        let skill = Skill::new("product", "Product")
            .with_triggers(["product"])
            .with_intents(["buy"])
            .with_instructions("secret internal prompt");
        let summary = SkillSummary::from(&skill);
        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(value["id"], json!("product"));
        assert_eq!(value["triggers"], json!(["product"]));
        assert!(value.get("instructions").is_none());
    }

    #[test]
    fn test_stream_event_frames() {
        let frame = StreamEvent::Content {
            delta: "Hel".to_string(),
        }
        .to_sse_frame();
        assert_eq!(frame, "event: content\ndata: {\"delta\":\"Hel\"}\n\n");

        let frame = StreamEvent::Routing {
            skill_id: "product".to_string(),
        }
        .to_sse_frame();
        assert!(frame.starts_with("event: routing\n"));
    }

    #[test]
    fn test_done_event_embeds_result() {
        let result = ChatResult {
            conversation_id: "c".to_string(),
            message_id: "m".to_string(),
            skill_id: "s".to_string(),
            variant: None,
            mode: ExecutionMode::Agentic,
            tool_calls: Vec::new(),
            response: json!({"answer":"ok"}),
            suggested_action: None,
            usage: TokenUsage::default(),
            duration: Duration::from_millis(10),
        };
        let frame = StreamEvent::Done {
            result: Box::new(result),
            suggested_action: None,
        }
        .to_sse_frame();
        assert!(frame.contains("\"conversationId\":\"c\""));
    }
}
