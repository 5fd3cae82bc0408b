//! The bounded agent loop.
//!
//! Issue an LM call with the skill's tools, execute the tool calls the
//! model emitted, append the results, and repeat until the model returns
//! final content or the turn cap is reached. Tool calls within one LM
//! response run sequentially in emission order; parallelism across turns
//! is impossible because each LM call depends on the prior response.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use palaver_core::error::EngineError;
use palaver_core::provider::{
    FinishReason, LlmMessage, LlmRequest, LlmToolCall, Provider, ResponseFormat, ToolDefinition,
};
use palaver_core::schema::validate_response;
use palaver_core::tool::{Action, Source, ToolContext, ToolInput};
use palaver_core::types::{Skill, SuggestedAction, TokenUsage, ToolCallRecord};
use palaver_core::EngineConfig;

const MAX_CONTENT_LOG_CHARS: usize = 2_000;

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Result of one agent-loop run.
#[derive(Debug)]
pub struct AgentLoopOutcome {
    /// Validated final response; `None` when the loop short-circuited
    /// into a suggested action.
    pub response: Option<Value>,
    /// Every tool invocation, in LM emission order.
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: TokenUsage,
    pub suggested_action: Option<SuggestedAction>,
}

/// The LM ↔ tool ping-pong, bounded by `max_agent_turns`.
pub struct AgentLoop<'a> {
    provider: &'a dyn Provider,
    config: &'a EngineConfig,
}

impl<'a> AgentLoop<'a> {
    pub fn new(provider: &'a dyn Provider, config: &'a EngineConfig) -> Self {
        Self { provider, config }
    }

    pub async fn run(
        &self,
        skill: &Skill,
        mut messages: Vec<LlmMessage>,
        sources: &[Arc<Source>],
        actions: &[Arc<Action>],
        tool_ctx: ToolContext,
    ) -> Result<AgentLoopOutcome, EngineError> {
        let tools: Vec<ToolDefinition> = sources
            .iter()
            .map(|s| s.definition())
            .chain(actions.iter().map(|a| a.definition()))
            .collect();
        let response_format = skill.output.as_ref().map(|_| ResponseFormat::JsonObject);

        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut usage = TokenUsage::default();

        for turn in 0..self.config.max_agent_turns {
            let request = LlmRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                response_format: response_format.clone(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };

            let response = tokio::select! {
                _ = tool_ctx.cancel.cancelled() => {
                    info!(
                        skill_id = %skill.id,
                        turn,
                        executed_tool_calls = tool_calls.len(),
                        "agent loop cancelled before llm call"
                    );
                    return Err(EngineError::Cancelled);
                }
                result = self.provider.chat(request) => result?,
            };
            usage.add(response.usage);

            if response.finish_reason == FinishReason::Length {
                return Err(EngineError::Llm("response truncated (length)".to_string()));
            }

            if !response.tool_calls.is_empty() {
                debug!(
                    skill_id = %skill.id,
                    turn,
                    tool_call_count = response.tool_calls.len(),
                    "agent loop executing tool calls"
                );
                messages.push(
                    LlmMessage::assistant(response.content.clone())
                        .with_tool_calls(response.tool_calls.clone()),
                );

                for call in &response.tool_calls {
                    if tool_ctx.cancel.is_cancelled() {
                        info!(
                            skill_id = %skill.id,
                            turn,
                            executed_tool_calls = tool_calls.len(),
                            pending_tool = %call.name,
                            "agent loop cancelled between tool executions"
                        );
                        return Err(EngineError::Cancelled);
                    }

                    match self
                        .dispatch(call, sources, actions, &tool_ctx, &mut tool_calls)
                        .await?
                    {
                        Dispatch::Continue(result_message) => messages.push(result_message),
                        Dispatch::Confirm(suggested) => {
                            info!(
                                skill_id = %skill.id,
                                tool = %suggested.tool,
                                "action requires confirmation, surfacing suggested action"
                            );
                            return Ok(AgentLoopOutcome {
                                response: None,
                                tool_calls,
                                usage,
                                suggested_action: Some(suggested),
                            });
                        }
                    }
                }
                continue;
            }

            // Final content.
            let value = validate_response(skill.output.as_ref(), &response.content)?;
            info!(
                skill_id = %skill.id,
                turns_used = turn + 1,
                tool_call_count = tool_calls.len(),
                "agent loop completed"
            );
            return Ok(AgentLoopOutcome {
                response: Some(value),
                tool_calls,
                usage,
                suggested_action: None,
            });
        }

        let executed: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
        Err(EngineError::internal_with_details(
            "max agent turns exceeded",
            json!({
                "maxAgentTurns": self.config.max_agent_turns,
                "toolCalls": executed,
            }),
        ))
    }

    async fn dispatch(
        &self,
        call: &LlmToolCall,
        sources: &[Arc<Source>],
        actions: &[Arc<Action>],
        tool_ctx: &ToolContext,
        tool_calls: &mut Vec<ToolCallRecord>,
    ) -> Result<Dispatch, EngineError> {
        let params: Map<String, Value> = serde_json::from_str(&call.arguments)
            .map_err(|e| EngineError::tool(&call.name, format!("invalid arguments: {e}")))?;

        if let Some(source) = sources.iter().find(|s| s.name == call.name) {
            let input = ToolInput::new(params.clone(), &source.params);
            let started = Instant::now();
            let result = tokio::select! {
                _ = tool_ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                r = source.fetch(input, tool_ctx.clone()) => r,
            };
            return Ok(Dispatch::Continue(record_result(
                call,
                params,
                result,
                started,
                tool_calls,
            )));
        }

        if let Some(action) = actions.iter().find(|a| a.name == call.name) {
            let started = Instant::now();
            if action.requires_confirmation {
                tool_calls.push(ToolCallRecord {
                    name: call.name.clone(),
                    params: params.clone(),
                    output: None,
                    error: None,
                    duration: started.elapsed(),
                });
                return Ok(Dispatch::Confirm(SuggestedAction {
                    tool: call.name.clone(),
                    params,
                    reason: Some("action requires user confirmation".to_string()),
                }));
            }

            let input = ToolInput::new(params.clone(), &action.params);
            let result = tokio::select! {
                _ = tool_ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                r = action.execute(input, tool_ctx.clone()) => r,
            };
            return Ok(Dispatch::Continue(record_result(
                call,
                params,
                result,
                started,
                tool_calls,
            )));
        }

        Err(EngineError::not_found("tool", call.name.clone()))
    }
}

enum Dispatch {
    Continue(LlmMessage),
    Confirm(SuggestedAction),
}

/// Record the execution and build the tool-result message fed back to
/// the LM. Executor failures are not retried; they are flagged so the
/// model can recover.
fn record_result(
    call: &LlmToolCall,
    params: Map<String, Value>,
    result: Result<Value, String>,
    started: Instant,
    tool_calls: &mut Vec<ToolCallRecord>,
) -> LlmMessage {
    let duration = started.elapsed();
    match result {
        Ok(output) => {
            let content = output.to_string();
            tool_calls.push(ToolCallRecord {
                name: call.name.clone(),
                params,
                output: Some(output),
                error: None,
                duration,
            });
            LlmMessage::tool_result(call.id.clone(), content)
        }
        Err(message) => {
            warn!(
                tool = %call.name,
                error = %truncate_for_log(&message, MAX_CONTENT_LOG_CHARS),
                "tool execution failed inside agent loop"
            );
            tool_calls.push(ToolCallRecord {
                name: call.name.clone(),
                params,
                output: None,
                error: Some(message.clone()),
                duration,
            });
            LlmMessage::failed_tool_result(call.id.clone(), format!("Error: {message}"))
        }
    }
}
