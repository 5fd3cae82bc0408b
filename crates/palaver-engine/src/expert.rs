//! The deterministic expert path.
//!
//! An expert is a host-supplied pair (fetcher, post-processor) bound to a
//! skill id. The fetcher controls exactly what data is fetched and may
//! call back into the tool registry for sources only; the path then makes
//! a single LM call. Actions are never executed here.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use palaver_core::error::EngineError;
use palaver_core::tool::{ToolContext, ToolInput, ToolRegistry};
use palaver_core::types::{Message, RequestContext, SuggestedAction, TokenUsage, ToolCallRecord};

/// Recent-history cap forwarded to experts.
pub const EXPERT_HISTORY_LIMIT: usize = 20;

/// The processed chat request handed to expert callbacks.
#[derive(Debug, Clone)]
pub struct ExpertRequest {
    pub message: String,
    pub entity_id: Option<String>,
    pub context: RequestContext,
    pub conversation_id: String,
    /// The most recent messages, oldest first, capped at
    /// [`EXPERT_HISTORY_LIMIT`].
    pub history: Vec<Message>,
}

/// The validated skill result the post-processor receives.
#[derive(Debug, Clone)]
pub struct SkillOutcome {
    pub response: Value,
    pub variant: Option<String>,
    pub usage: TokenUsage,
}

/// What an expert post-processor returns; serialised as the final
/// response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertReply {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<SuggestedAction>,
}

/// Read-only tool access granted to expert fetchers.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<Value, EngineError>;
}

/// Retrieves data for the skill before the LM call.
#[async_trait]
pub trait ExpertFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &ExpertRequest,
        tools: &dyn ToolExecutor,
    ) -> Result<Value, String>;
}

/// Transforms the skill result before it becomes the final response.
#[async_trait]
pub trait ExpertPostProcess: Send + Sync {
    async fn run(
        &self,
        request: &ExpertRequest,
        outcome: &SkillOutcome,
        data: Option<&Value>,
    ) -> Result<ExpertReply, String>;
}

/// A host-supplied expert bound to one skill id.
#[derive(Clone)]
pub struct Expert {
    pub skill_id: String,
    pub fetcher: Option<Arc<dyn ExpertFetcher>>,
    pub post_process: Option<Arc<dyn ExpertPostProcess>>,
}

impl Expert {
    pub fn new(skill_id: impl Into<String>) -> Self {
        Self {
            skill_id: skill_id.into(),
            fetcher: None,
            post_process: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ExpertFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_post_process(mut self, post_process: Arc<dyn ExpertPostProcess>) -> Self {
        self.post_process = Some(post_process);
        self
    }
}

impl std::fmt::Debug for Expert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expert")
            .field("skill_id", &self.skill_id)
            .field("fetcher", &self.fetcher.is_some())
            .field("post_process", &self.post_process.is_some())
            .finish()
    }
}

/// Tool executor handed to expert fetchers: resolves sources only and
/// records every call.
pub struct SourceOnlyExecutor {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    records: Mutex<Vec<ToolCallRecord>>,
}

impl SourceOnlyExecutor {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self {
            registry,
            ctx,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Drain the recorded calls, in execution order.
    pub fn take_records(&self) -> Vec<ToolCallRecord> {
        std::mem::take(
            &mut *self
                .records
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

#[async_trait]
impl ToolExecutor for SourceOnlyExecutor {
    async fn execute(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let source = self
            .registry
            .source(name)
            .ok_or_else(|| EngineError::not_found("tool", name))?;

        let started = Instant::now();
        let input = ToolInput::new(params.clone(), &source.params);
        let result = source.fetch(input, self.ctx.clone()).await;
        let duration = started.elapsed();

        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(output) => {
                records.push(ToolCallRecord {
                    name: name.to_string(),
                    params,
                    output: Some(output.clone()),
                    error: None,
                    duration,
                });
                Ok(output)
            }
            Err(message) => {
                records.push(ToolCallRecord {
                    name: name.to_string(),
                    params,
                    output: None,
                    error: Some(message.clone()),
                    duration,
                });
                Err(EngineError::tool(name, message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::error::ErrorCode;
    use palaver_core::tool::{Action, ParamDef, Source};
    use serde_json::json;

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register_source(
            Source::new("get_price", "Price lookup", |input, _ctx| async move {
                Ok(json!({ "sku": input.string("sku"), "price": 299 }))
            })
            .param("sku", ParamDef::string("SKU").required()),
        );
        registry.register_action(Action::new("delete_all", "Dangerous", |_i, _c| async {
            Ok(json!({"deleted": true}))
        }));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_executor_runs_sources_and_records_calls() {
        let executor = SourceOnlyExecutor::new(registry(), ToolContext::new());

        let mut params = Map::new();
        params.insert("sku".to_string(), json!("W-1"));
        let out = executor.execute("get_price", params).await.expect("execute");
        assert_eq!(out["price"], json!(299));

        let records = executor.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "get_price");
        assert_eq!(records[0].output.as_ref().map(|v| v["price"].clone()), Some(json!(299)));
        // Records were drained.
        assert!(executor.take_records().is_empty());
    }

    #[tokio::test]
    async fn test_executor_refuses_actions() {
        let executor = SourceOnlyExecutor::new(registry(), ToolContext::new());
        let err = executor.execute("delete_all", Map::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_executor_records_failed_calls() {
        let registry = ToolRegistry::new();
        registry.register_source(Source::new("broken", "Fails", |_i, _c| async {
            Err("nope".to_string())
        }));
        let executor = SourceOnlyExecutor::new(Arc::new(registry), ToolContext::new());

        let err = executor.execute("broken", Map::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ToolExecution);
        let records = executor.take_records();
        assert_eq!(records[0].error.as_deref(), Some("nope"));
    }

    #[test]
    fn test_expert_reply_serializes_camel_case() {
        let reply = ExpertReply {
            answer: "done".to_string(),
            details: Some(json!({"k": 1})),
            suggested_action: Some(SuggestedAction {
                tool: "create_ticket".to_string(),
                params: Map::new(),
                reason: None,
            }),
        };
        let value = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(value["answer"], json!("done"));
        assert_eq!(value["suggestedAction"]["tool"], json!("create_ticket"));
    }
}
