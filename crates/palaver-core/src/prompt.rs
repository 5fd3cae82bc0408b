//! Prompt assembly.
//!
//! Builds the ordered LM message sequence for a turn: system instructions
//! (variant or skill), guardrails, spliced context values, the declared
//! output schema, few-shot examples, fetched data, and the user turn.

use serde_json::Value;

use crate::provider::LlmMessage;
use crate::schema::output_schema_to_json_schema;
use crate::types::{RequestContext, Skill};
use crate::variant::SelectedVariant;

/// Assembles LM message sequences. Stateless apart from the configured
/// base prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    base_prompt: Option<String>,
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_prompt(mut self, base_prompt: impl Into<String>) -> Self {
        self.base_prompt = Some(base_prompt.into());
        self
    }

    /// Message sequence for the expert path. `data` is the expert
    /// fetcher's result, rendered as an "Available data:" system message
    /// between the examples and the user turn.
    pub fn expert_messages(
        &self,
        skill: &Skill,
        variant: &SelectedVariant,
        message: &str,
        data: Option<&Value>,
        context: &RequestContext,
    ) -> Vec<LlmMessage> {
        let mut messages = self.common_prefix(skill, variant, context);
        if let Some(data) = data {
            messages.push(LlmMessage::system(format!(
                "Available data:\n{}",
                pretty(data)
            )));
        }
        messages.push(LlmMessage::user(message));
        messages
    }

    /// Message sequence for the agent loop. `seed_data` is only present
    /// when a pre-hook injected it, rendered as an "Initial data:" system
    /// message immediately before the user turn.
    pub fn agent_messages(
        &self,
        skill: &Skill,
        variant: &SelectedVariant,
        message: &str,
        seed_data: Option<&Value>,
        context: &RequestContext,
    ) -> Vec<LlmMessage> {
        let mut messages = self.common_prefix(skill, variant, context);
        if let Some(data) = seed_data {
            messages.push(LlmMessage::system(format!(
                "Initial data:\n{}",
                pretty(data)
            )));
        }
        messages.push(LlmMessage::user(message));
        messages
    }

    fn common_prefix(
        &self,
        skill: &Skill,
        variant: &SelectedVariant,
        context: &RequestContext,
    ) -> Vec<LlmMessage> {
        let mut messages = vec![LlmMessage::system(self.system_content(
            skill, variant, context,
        ))];
        for example in &skill.examples {
            messages.push(LlmMessage::user(&example.user));
            messages.push(LlmMessage::assistant(&example.assistant));
        }
        messages
    }

    fn system_content(
        &self,
        skill: &Skill,
        variant: &SelectedVariant,
        context: &RequestContext,
    ) -> String {
        let mut content = String::new();
        if let Some(base) = &self.base_prompt {
            content.push_str(base);
            content.push_str("\n\n");
        }
        content.push_str(&variant.instructions);

        if !skill.guardrails.is_empty() {
            content.push_str("\n\nRules:\n");
            for rule in &skill.guardrails {
                content.push_str("- ");
                content.push_str(rule);
                content.push('\n');
            }
        }

        let context_lines: Vec<String> = skill
            .context_keys
            .iter()
            .filter_map(|key| context.get(key).map(|value| format_context_line(key, value)))
            .collect();
        if !context_lines.is_empty() {
            content.push_str("\n\nContext:\n");
            for line in context_lines {
                content.push_str(&line);
                content.push('\n');
            }
        }

        if let Some(output) = &skill.output {
            content.push_str("\n\nYou MUST respond with valid JSON matching this schema:\n");
            content.push_str(&pretty(&output_schema_to_json_schema(output)));
        }

        content
    }
}

fn format_context_line(key: &str, value: &Value) -> String {
    match value.as_str() {
        Some(text) => format!("- {key}: {text}"),
        None => format!("- {key}: {value}"),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
