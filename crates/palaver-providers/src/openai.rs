//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the OpenAI wire format. The
//! streaming variant forwards content deltas as they arrive and buffers
//! tool-call argument deltas to completion before returning them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use palaver_core::provider::{
    FinishReason, LlmMessage, LlmRequest, LlmResponse, LlmToolCall, Provider, ProviderError,
    ResponseFormat, StreamChunkCallback,
};
use palaver_core::types::TokenUsage;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub extra_headers: HeaderMap,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            timeout_secs: 60,
            extra_headers: HeaderMap::new(),
        }
    }
}

/// OpenAI-compatible HTTP client.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = self.config.extra_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = format!("Bearer {key}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| ProviderError::Http(e.to_string()))?,
            );
        }
        Ok(headers)
    }

    async fn post(&self, body: &WireRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Response(format!("HTTP {status}: {text}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiClient {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        let body = WireRequest::from_request(&request, false);
        let response = self.post(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        let parsed: WireResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Serialization(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Response("missing choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_tool_call)
            .collect::<Vec<_>>();
        let finish_reason = map_finish_reason(choice.finish_reason.as_deref(), !tool_calls.is_empty());

        debug!(
            finish_reason = ?finish_reason,
            tool_call_count = tool_calls.len(),
            "chat completion received"
        );
        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason,
            usage: parsed.usage.map(WireUsage::into_usage).unwrap_or_default(),
        })
    }

    async fn chat_stream(
        &self,
        request: LlmRequest,
        on_chunk: StreamChunkCallback,
    ) -> Result<LlmResponse, ProviderError> {
        let body = WireRequest::from_request(&request, true);
        let response = self.post(&body).await?;

        let mut collector = StreamCollector::default();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Http(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(position) = buffer.find('\n') {
                let line = buffer[..position].trim().to_string();
                buffer.drain(..=position);
                collector.consume_line(&line, &on_chunk)?;
            }
        }
        collector.consume_line(buffer.trim(), &on_chunk)?;

        Ok(collector.finish())
    }
}

fn map_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    match reason {
        Some("tool_calls") => FinishReason::ToolUse,
        Some("length") => FinishReason::Length,
        Some(_) | None if has_tool_calls => FinishReason::ToolUse,
        _ => FinishReason::End,
    }
}

/// Accumulates SSE deltas into a complete response. Tool-call argument
/// fragments are keyed by their stream index and only surfaced once the
/// stream ends.
#[derive(Default)]
struct StreamCollector {
    content: String,
    tool_calls: BTreeMap<usize, PendingToolCall>,
    finish_reason: Option<String>,
    usage: TokenUsage,
    done: bool,
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamCollector {
    fn consume_line(
        &mut self,
        line: &str,
        on_chunk: &StreamChunkCallback,
    ) -> Result<(), ProviderError> {
        let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
            return Ok(());
        };
        if payload.is_empty() {
            return Ok(());
        }
        if payload == "[DONE]" {
            self.done = true;
            return Ok(());
        }

        let chunk: WireChunk = serde_json::from_str(payload)
            .map_err(|e| ProviderError::Serialization(e.to_string()))?;
        if let Some(usage) = chunk.usage {
            self.usage = usage.into_usage();
        }
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                self.content.push_str(&content);
                on_chunk(content);
            }
        }
        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let pending = self.tool_calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                pending.id = id;
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    pending.name = name;
                }
                if let Some(arguments) = function.arguments {
                    pending.arguments.push_str(&arguments);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> LlmResponse {
        let tool_calls: Vec<LlmToolCall> = self
            .tool_calls
            .into_values()
            .map(|pending| LlmToolCall {
                id: pending.id,
                name: pending.name,
                arguments: pending.arguments,
            })
            .collect();
        let finish_reason = map_finish_reason(self.finish_reason.as_deref(), !tool_calls.is_empty());
        LlmResponse {
            content: self.content,
            tool_calls,
            finish_reason,
            usage: self.usage,
        }
    }
}

// Wire structs

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl WireRequest {
    fn from_request(request: &LlmRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from_message).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
            response_format: request.response_format.as_ref().map(|format| match format {
                ResponseFormat::JsonObject => WireResponseFormat {
                    kind: "json_object".to_string(),
                    json_schema: None,
                },
                ResponseFormat::JsonSchema { name, schema } => WireResponseFormat {
                    kind: "json_schema".to_string(),
                    json_schema: Some(WireJsonSchema {
                        name: name.clone(),
                        schema: schema.clone(),
                        strict: true,
                    }),
                },
            }),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn from_message(message: &LlmMessage) -> Self {
        // The wire format has no error flag on tool results; the content
        // already carries the error text.
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: (!message.tool_calls.is_empty()).then(|| {
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

impl WireToolCall {
    fn into_tool_call(self) -> LlmToolCall {
        LlmToolCall {
            id: self.id,
            name: self.function.name,
            arguments: self.function.arguments,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<WireJsonSchema>,
}

#[derive(Serialize)]
struct WireJsonSchema {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChunkChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl WireUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}
