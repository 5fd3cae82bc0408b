//! LM provider contract.
//!
//! A provider exposes one operation: given a message sequence, tool
//! definitions and an optional response format, produce an assistant
//! message. Concrete adapters (OpenAI-compatible HTTP, mocks) live in
//! `palaver-providers`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::TokenUsage;

/// A provider-agnostic chat request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub response_format: Option<ResponseFormat>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A provider-agnostic message.
#[derive(Debug, Clone)]
pub struct LlmMessage {
    /// "system", "user", "assistant" or "tool".
    pub role: &'static str,
    pub content: String,
    /// Tool calls carried by assistant messages.
    pub tool_calls: Vec<LlmToolCall>,
    /// The originating call id on tool-result messages.
    pub tool_call_id: Option<String>,
    /// Marks a tool-result message as a failed call, giving the LM a
    /// chance to recover.
    pub is_error: bool,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool",
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            is_error: false,
        }
    }

    pub fn failed_tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::tool_result(call_id, content);
        message.is_error = true;
        message
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<LlmToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    fn plain(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }
}

/// A tool invocation requested by the LM. Arguments arrive as the raw
/// JSON text the model emitted; the engine parses them before dispatch.
#[derive(Debug, Clone)]
pub struct LlmToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A tool definition exposed to the LM: name, description and the
/// JSON-Schema rendering of the parameters.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Structured-output hint passed to the provider.
#[derive(Debug, Clone)]
pub enum ResponseFormat {
    /// Any valid JSON object.
    JsonObject,
    /// A named JSON schema, for providers with strict structured output.
    JsonSchema { name: String, schema: Value },
}

/// Why the model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    End,
    ToolUse,
    Length,
}

/// A provider-agnostic response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<LlmToolCall>,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

impl LlmResponse {
    /// A plain final-content response, mostly useful in tests.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::End,
            usage: TokenUsage::default(),
        }
    }
}

/// Callback receiving streamed content deltas.
pub type StreamChunkCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// LM provider contract.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError>;

    /// Streaming variant. Content deltas are forwarded through `on_chunk`;
    /// tool-call deltas are buffered to completion and returned on the
    /// final response. The default implementation degrades to a unary
    /// call chunked on whitespace.
    async fn chat_stream(
        &self,
        request: LlmRequest,
        on_chunk: StreamChunkCallback,
    ) -> Result<LlmResponse, ProviderError> {
        let response = self.chat(request).await?;
        for token in response.content.split_inclusive(char::is_whitespace) {
            if !token.is_empty() {
                on_chunk(token.to_string());
            }
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for Arc<dyn Provider> {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        (**self).chat(request).await
    }

    async fn chat_stream(
        &self,
        request: LlmRequest,
        on_chunk: StreamChunkCallback,
    ) -> Result<LlmResponse, ProviderError> {
        (**self).chat_stream(request, on_chunk).await
    }
}
