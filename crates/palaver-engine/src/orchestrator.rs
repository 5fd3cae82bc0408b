//! The orchestrator: front door of the engine.
//!
//! Owns the per-request control flow: validation, conversation handling,
//! routing, mode resolution, hook invocation around the expert or agent
//! path, persistence hand-off, and result assembly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use palaver_core::config::EngineConfig;
use palaver_core::error::EngineError;
use palaver_core::hooks::{HookRegistry, PostHookContext, PreHookContext};
use palaver_core::prompt::PromptAssembler;
use palaver_core::provider::{FinishReason, LlmRequest, Provider, ResponseFormat};
use palaver_core::router::{KeywordRouter, Router};
use palaver_core::schema::validate_response;
use palaver_core::skills::SkillRegistry;
use palaver_core::store::{ConversationStore, StoreError};
use palaver_core::tool::{ToolContext, ToolRegistry};
use palaver_core::types::{
    validate_id, ChatRequest, ChatResult, Conversation, ExecutionMode, Feedback, FeedbackSnapshot,
    Message, RequestContext, Role, Skill, SuggestedAction, TokenUsage, ToolCallRecord,
};
use palaver_core::variant::{SelectedVariant, VariantPolicy, VariantSelector};
use palaver_stores::InMemoryConversationStore;

use crate::agent_loop::AgentLoop;
use crate::expert::{
    Expert, ExpertRequest, SkillOutcome, SourceOnlyExecutor, EXPERT_HISTORY_LIMIT,
};

/// What either execution path produces before persistence.
struct PathOutcome {
    response: Value,
    tool_calls: Vec<ToolCallRecord>,
    usage: TokenUsage,
    suggested_action: Option<SuggestedAction>,
}

/// The conversation engine.
///
/// Built once at startup via [`Engine::builder`]; cheap to share behind an
/// `Arc` and safe to call from arbitrarily many concurrent requests.
pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    skills: Arc<SkillRegistry>,
    tools: Arc<ToolRegistry>,
    hooks: Arc<HookRegistry>,
    experts: HashMap<String, Expert>,
    store: Arc<dyn ConversationStore>,
    router: Arc<dyn Router>,
    variants: VariantSelector,
    assembler: PromptAssembler,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn skills(&self) -> &Arc<SkillRegistry> {
        &self.skills
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process a chat turn.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResult, EngineError> {
        self.chat_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Process a chat turn with caller-controlled cancellation. The token
    /// propagates into every LM call and tool execution.
    pub async fn chat_with_cancellation(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResult, EngineError> {
        let started = Instant::now();
        self.validate_request(&request)?;

        let (skill, route_confidence) = self.route(&request).await?;
        let mode = request
            .mode
            .or(skill.mode)
            .unwrap_or(self.config.execution_mode);
        info!(
            skill_id = %skill.id,
            mode = ?mode,
            confidence = route_confidence,
            "routed chat request"
        );

        let conversation = self.load_or_create_conversation(&request).await?;
        let conversation_id = conversation.id.clone();

        // The user turn lands in the store before the first LM call;
        // persistence failures are logged, never fatal.
        let user_message = Message::user(&conversation_id, &request.message);
        if let Err(err) = self
            .store
            .append_message(&conversation_id, user_message)
            .await
        {
            warn!(conversation_id = %conversation_id, error = %err, "failed to persist user message");
        }

        let variant = self.variants.select(
            &skill,
            request.variant.as_deref(),
            self.sticky_identifier(&request),
        );

        let tool_ctx = ToolContext::new()
            .with_cancel(cancel.clone())
            .with_conversation_id(conversation_id.clone());
        let tool_ctx = match &request.entity_id {
            Some(entity_id) => tool_ctx.with_entity_id(entity_id.clone()),
            None => tool_ctx,
        };

        let path = async {
            match mode {
                ExecutionMode::Expert => {
                    self.run_expert(&request, &skill, &variant, &conversation, tool_ctx)
                        .await
                }
                ExecutionMode::Agentic => {
                    self.run_agent(&request, &skill, &variant, tool_ctx).await
                }
            }
        };
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = tokio::time::timeout(self.config.request_timeout(), path) => {
                result.unwrap_or(Err(EngineError::Timeout))
            }
        }?;

        let assistant_content = match &outcome.response {
            Value::Null => String::new(),
            value => value.to_string(),
        };
        let assistant_message = Message::assistant(&conversation_id, assistant_content)
            .with_skill(&skill.id, variant.id.clone())
            .with_tool_calls(outcome.tool_calls.clone());
        let message_id = assistant_message.id.clone();
        if let Err(err) = self
            .store
            .append_message(&conversation_id, assistant_message)
            .await
        {
            warn!(conversation_id = %conversation_id, error = %err, "failed to persist assistant message");
        }

        Ok(ChatResult {
            conversation_id,
            message_id,
            skill_id: skill.id.clone(),
            variant: variant.id,
            mode,
            tool_calls: outcome.tool_calls,
            response: outcome.response,
            suggested_action: outcome.suggested_action,
            usage: outcome.usage,
            duration: started.elapsed(),
        })
    }

    /// Execute a previously suggested action after the user confirmed it.
    pub async fn execute_action(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let action = self
            .tools
            .action(name)
            .ok_or_else(|| EngineError::not_found("action", name))?;
        let input = palaver_core::tool::ToolInput::new(params, &action.params);
        action
            .execute(input, ToolContext::new())
            .await
            .map_err(|message| EngineError::tool(name, message))
    }

    /// Fetch a conversation.
    pub async fn conversation(&self, id: &str) -> Result<Conversation, EngineError> {
        validate_id(id)?;
        Ok(self.store.get(id).await?)
    }

    /// Record feedback on an assistant message, snapshotting the exchange
    /// and the variant for off-line analysis.
    pub async fn submit_feedback(
        &self,
        conversation_id: &str,
        message_id: &str,
        rating: i32,
        comment: Option<String>,
    ) -> Result<Feedback, EngineError> {
        validate_id(conversation_id)?;
        let conversation = self.store.get(conversation_id).await?;
        let index = conversation
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| EngineError::not_found("message", message_id))?;
        let message = &conversation.messages[index];

        let user_turn = conversation.messages[..index]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let mut feedback = Feedback::new(conversation_id, message_id, rating).with_snapshot(
            FeedbackSnapshot {
                user_message: user_turn,
                assistant_response: message.content.clone(),
                context: conversation.context.clone(),
                variant: message.variant.clone(),
            },
        );
        if let Some(comment) = comment {
            feedback = feedback.with_comment(comment);
        }

        self.store.save_feedback(feedback.clone()).await?;
        Ok(feedback)
    }

    fn validate_request(&self, request: &ChatRequest) -> Result<(), EngineError> {
        if request.message.trim().is_empty() {
            return Err(EngineError::validation(
                "message-empty",
                "message must not be empty",
            ));
        }
        let length = request.message.chars().count();
        if length > self.config.max_message_length {
            return Err(EngineError::validation(
                "too-large",
                format!(
                    "message length {length} exceeds the maximum of {}",
                    self.config.max_message_length
                ),
            ));
        }
        if let Some(id) = &request.conversation_id {
            validate_id(id)?;
        }
        Ok(())
    }

    async fn route(&self, request: &ChatRequest) -> Result<(Arc<Skill>, f32), EngineError> {
        if let Some(skill_id) = &request.skill_id {
            let skill = self
                .skills
                .get(skill_id)
                .ok_or_else(|| EngineError::not_found("skill", skill_id.clone()))?;
            return Ok((skill, 1.0));
        }

        let decision = self
            .router
            .route(&request.message, request.entity_id.as_deref())
            .await?
            .ok_or_else(|| {
                EngineError::Routing("no skill matched and no default skill configured".to_string())
            })?;
        Ok((decision.skill, decision.confidence))
    }

    async fn load_or_create_conversation(
        &self,
        request: &ChatRequest,
    ) -> Result<Conversation, EngineError> {
        match &request.conversation_id {
            None => Ok(self.store.create(request.entity_id.clone()).await?),
            Some(id) => match self.store.get(id).await {
                Ok(conversation) => Ok(conversation),
                Err(StoreError::NotFound(_)) => {
                    let conversation =
                        Conversation::with_id(id.clone(), request.entity_id.clone());
                    self.store.save(&conversation).await?;
                    Ok(conversation)
                }
                Err(err) => {
                    // Missing history is not fatal; work from a fresh handle.
                    warn!(conversation_id = %id, error = %err, "failed to load conversation history");
                    Ok(Conversation::with_id(id.clone(), request.entity_id.clone()))
                }
            },
        }
    }

    fn sticky_identifier<'a>(&self, request: &'a ChatRequest) -> Option<&'a str> {
        request
            .context
            .get("userId")
            .and_then(|v| v.as_str())
            .or(request.entity_id.as_deref())
    }

    async fn run_expert(
        &self,
        request: &ChatRequest,
        skill: &Skill,
        variant: &SelectedVariant,
        conversation: &Conversation,
        tool_ctx: ToolContext,
    ) -> Result<PathOutcome, EngineError> {
        let expert = self.experts.get(&skill.id);
        let expert_request = ExpertRequest {
            message: request.message.clone(),
            entity_id: request.entity_id.clone(),
            context: request.context.clone(),
            conversation_id: conversation.id.clone(),
            history: conversation.recent_messages(EXPERT_HISTORY_LIMIT).to_vec(),
        };

        let executor = SourceOnlyExecutor::new(self.tools.clone(), tool_ctx);
        let mut fetched: Option<Value> = None;
        if let Some(fetcher) = expert.and_then(|e| e.fetcher.as_ref()) {
            fetched = Some(
                fetcher
                    .fetch(&expert_request, &executor)
                    .await
                    .map_err(|message| EngineError::tool("fetcher", message))?,
            );
        }

        let mut metadata = HashMap::new();
        let mut context = request.context.clone();
        if let Some(hook) = self.hooks.pre(&skill.id) {
            let mut hook_ctx = PreHookContext {
                skill_id: skill.id.clone(),
                message: request.message.clone(),
                data: fetched,
                context,
                metadata,
            };
            hook.run(&mut hook_ctx)
                .await
                .map_err(|e| EngineError::internal(format!("pre-hook failed: {e}")))?;
            fetched = hook_ctx.data;
            context = hook_ctx.context;
            metadata = hook_ctx.metadata;
        }

        let messages = self.assembler.expert_messages(
            skill,
            variant,
            &request.message,
            fetched.as_ref(),
            &context,
        );
        let llm_request = LlmRequest {
            model: self.config.model.clone(),
            messages,
            tools: Vec::new(),
            response_format: skill.output.as_ref().map(|_| ResponseFormat::JsonObject),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        debug!(skill_id = %skill.id, "expert path issuing single llm call");
        let response = self.provider.chat(llm_request).await?;
        let usage = response.usage;
        if response.finish_reason == FinishReason::Length {
            return Err(EngineError::Llm("response truncated (length)".to_string()));
        }

        let mut response_value = validate_response(skill.output.as_ref(), &response.content)?;
        response_value = self
            .apply_post_hook(
                skill,
                &request.message,
                response_value,
                fetched.as_ref(),
                &context,
                metadata,
                variant.id.clone(),
                usage,
            )
            .await?;

        let mut suggested_action = None;
        if let Some(post_process) = expert.and_then(|e| e.post_process.as_ref()) {
            let outcome = SkillOutcome {
                response: response_value.clone(),
                variant: variant.id.clone(),
                usage,
            };
            let reply = post_process
                .run(&expert_request, &outcome, fetched.as_ref())
                .await
                .map_err(|e| EngineError::internal(format!("expert post-processing failed: {e}")))?;
            suggested_action = reply.suggested_action.clone();
            response_value = serde_json::to_value(&reply)
                .map_err(|e| EngineError::internal(format!("expert reply serialization: {e}")))?;
        }

        Ok(PathOutcome {
            response: response_value,
            tool_calls: executor.take_records(),
            usage,
            suggested_action,
        })
    }

    async fn run_agent(
        &self,
        request: &ChatRequest,
        skill: &Skill,
        variant: &SelectedVariant,
        tool_ctx: ToolContext,
    ) -> Result<PathOutcome, EngineError> {
        let (sources, actions) = self.tools.resolve_for_skill(&skill.tools)?;

        let mut metadata = HashMap::new();
        let mut context = request.context.clone();
        let mut seed_data: Option<Value> = None;
        if let Some(hook) = self.hooks.pre(&skill.id) {
            let mut hook_ctx = PreHookContext {
                skill_id: skill.id.clone(),
                message: request.message.clone(),
                data: None,
                context,
                metadata,
            };
            hook.run(&mut hook_ctx)
                .await
                .map_err(|e| EngineError::internal(format!("pre-hook failed: {e}")))?;
            seed_data = hook_ctx.data;
            context = hook_ctx.context;
            metadata = hook_ctx.metadata;
        }

        let messages = self.assembler.agent_messages(
            skill,
            variant,
            &request.message,
            seed_data.as_ref(),
            &context,
        );
        let agent_loop = AgentLoop::new(self.provider.as_ref(), &self.config);
        let outcome = agent_loop
            .run(skill, messages, &sources, &actions, tool_ctx)
            .await?;

        let mut response = outcome.response.unwrap_or(Value::Null);
        if outcome.suggested_action.is_none() {
            response = self
                .apply_post_hook(
                    skill,
                    &request.message,
                    response,
                    seed_data.as_ref(),
                    &context,
                    metadata,
                    variant.id.clone(),
                    outcome.usage,
                )
                .await?;
        }

        Ok(PathOutcome {
            response,
            tool_calls: outcome.tool_calls,
            usage: outcome.usage,
            suggested_action: outcome.suggested_action,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_post_hook(
        &self,
        skill: &Skill,
        message: &str,
        response: Value,
        data: Option<&Value>,
        context: &RequestContext,
        metadata: HashMap<String, Value>,
        variant: Option<String>,
        usage: TokenUsage,
    ) -> Result<Value, EngineError> {
        let Some(hook) = self.hooks.post(&skill.id) else {
            return Ok(response);
        };

        let response_map = match response {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut hook_ctx = PostHookContext {
            skill_id: skill.id.clone(),
            message: message.to_string(),
            response: response_map,
            data: data.cloned(),
            context: context.clone(),
            metadata,
            variant,
            usage,
        };
        hook.run(&mut hook_ctx)
            .await
            .map_err(|e| EngineError::internal(format!("post-hook failed: {e}")))?;
        Ok(Value::Object(hook_ctx.response))
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    provider: Option<Arc<dyn Provider>>,
    skills: Option<Arc<SkillRegistry>>,
    tools: Option<Arc<ToolRegistry>>,
    hooks: Option<Arc<HookRegistry>>,
    experts: Vec<Expert>,
    store: Option<Arc<dyn ConversationStore>>,
    router: Option<Arc<dyn Router>>,
    variant_policy: Option<VariantPolicy>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn skills(mut self, skills: Arc<SkillRegistry>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn expert(mut self, expert: Expert) -> Self {
        self.experts.push(expert);
        self
    }

    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn variant_policy(mut self, policy: VariantPolicy) -> Self {
        self.variant_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let provider = self
            .provider
            .ok_or_else(|| EngineError::Configuration("an LM provider is required".to_string()))?;
        let skills = self.skills.unwrap_or_else(|| Arc::new(SkillRegistry::new()));
        if skills.is_empty() {
            return Err(EngineError::Configuration(
                "at least one skill must be registered".to_string(),
            ));
        }
        let tools = self.tools.unwrap_or_else(|| Arc::new(ToolRegistry::new()));
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(HookRegistry::new()));
        let store: Arc<dyn ConversationStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryConversationStore::new()));
        let router: Arc<dyn Router> = self.router.unwrap_or_else(|| {
            Arc::new(KeywordRouter::new(
                skills.clone(),
                config.default_skill_id.clone(),
            ))
        });
        let variants =
            VariantSelector::new(self.variant_policy.unwrap_or(VariantPolicy::Sticky));

        let mut assembler = PromptAssembler::new();
        if let Some(base_prompt) = &config.base_prompt {
            assembler = assembler.with_base_prompt(base_prompt.clone());
        }

        let mut experts = HashMap::new();
        for expert in self.experts {
            if skills.get(&expert.skill_id).is_none() {
                return Err(EngineError::Configuration(format!(
                    "expert references unknown skill '{}'",
                    expert.skill_id
                )));
            }
            experts.insert(expert.skill_id.clone(), expert);
        }

        Ok(Engine {
            config,
            provider,
            skills,
            tools,
            hooks,
            experts,
            store,
            router,
            variants,
            assembler,
        })
    }
}
