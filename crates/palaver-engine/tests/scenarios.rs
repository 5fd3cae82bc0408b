//! End-to-end engine scenarios against the scripted mock provider and
//! the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use palaver_core::error::{EngineError, ErrorCode};
use palaver_core::hooks::{HookRegistry, PostHook, PostHookContext, PreHook, PreHookContext};
use palaver_core::provider::{FinishReason, LlmResponse, LlmToolCall};
use palaver_core::skills::SkillRegistry;
use palaver_core::tool::{Action, ParamDef, Source, ToolRegistry};
use palaver_core::types::{
    ChatRequest, ExecutionMode, OutputSchema, PropertySchema, RequestContext, Role, Skill,
    SkillVariant, TokenUsage,
};
use palaver_core::EngineConfig;
use palaver_core::ConversationStore;
use palaver_engine::Engine;
use palaver_providers::MockProvider;
use palaver_stores::InMemoryConversationStore;

fn answer_schema() -> OutputSchema {
    OutputSchema::object()
        .property("answer", PropertySchema::string())
        .require(["answer"])
}

fn product_skill() -> Skill {
    Skill::new("product", "Product questions")
        .with_triggers(["product"])
        .with_instructions("Answer product questions.")
        .with_output(answer_schema())
}

fn tool_use(calls: Vec<(&str, &str, &str)>) -> LlmResponse {
    LlmResponse {
        content: String::new(),
        tool_calls: calls
            .into_iter()
            .map(|(id, name, arguments)| LlmToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            })
            .collect(),
        finish_reason: FinishReason::ToolUse,
        usage: TokenUsage::default(),
    }
}

struct Harness {
    engine: Engine,
    provider: Arc<MockProvider>,
    store: Arc<InMemoryConversationStore>,
}

fn harness(provider: MockProvider, skills: Vec<Skill>, configure: impl FnOnce(&ToolRegistry)) -> Harness {
    let provider = Arc::new(provider);
    let registry = SkillRegistry::new();
    for skill in skills {
        registry.register(skill).expect("register skill");
    }
    let tools = ToolRegistry::new();
    configure(&tools);
    let store = Arc::new(InMemoryConversationStore::new());

    let engine = Engine::builder()
        .provider(provider.clone())
        .skills(Arc::new(registry))
        .tools(Arc::new(tools))
        .store(store.clone())
        .build()
        .expect("engine");

    Harness {
        engine,
        provider,
        store,
    }
}

// S1: expert path, no fetcher, one LM call.
#[tokio::test]
async fn test_expert_path_without_fetcher() {
    let provider = MockProvider::new()
        .enqueue(LlmResponse::text(r#"{"answer":"The Widget Pro costs $299."}"#));
    let h = harness(provider, vec![product_skill()], |_| {});

    let result = h
        .engine
        .chat(ChatRequest::new("tell me about the product"))
        .await
        .expect("chat");

    assert_eq!(result.response, json!({"answer": "The Widget Pro costs $299."}));
    assert_eq!(result.skill_id, "product");
    assert!(result.tool_calls.is_empty());
    assert_eq!(result.mode, ExecutionMode::Expert);
    assert_eq!(h.provider.calls().len(), 1);
    assert!(!result.conversation_id.is_empty());
    assert!(!result.message_id.is_empty());
}

// S2: agent loop executes two tool calls in emission order.
#[tokio::test]
async fn test_agent_loop_two_tool_calls_in_order() {
    let provider = MockProvider::new()
        .enqueue(tool_use(vec![
            ("call_1", "get_weather", r#"{"city":"Tokyo"}"#),
            ("call_2", "get_time", r#"{"tz":"Asia/Tokyo"}"#),
        ]))
        .enqueue(LlmResponse::text(r#"{"answer":"18°C, 15:04"}"#));

    let skill = Skill::new("assistant", "General assistant")
        .with_tools(["get_weather", "get_time"])
        .with_output(answer_schema());
    let h = harness(provider, vec![skill], |tools| {
        tools.register_source(
            Source::new("get_weather", "Current weather", |_i, _c| async {
                Ok(json!({"temp": 18}))
            })
            .param("city", ParamDef::string("City").required()),
        );
        tools.register_source(
            Source::new("get_time", "Current time", |_i, _c| async {
                Ok(json!({"time": "15:04"}))
            })
            .param("tz", ParamDef::string("Time zone").required()),
        );
    });

    let result = h
        .engine
        .chat(
            ChatRequest::new("weather and time in Tokyo")
                .with_mode(ExecutionMode::Agentic)
                .with_skill_id("assistant"),
        )
        .await
        .expect("chat");

    let names: Vec<&str> = result.tool_calls.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["get_weather", "get_time"]);
    assert_eq!(result.response, json!({"answer": "18°C, 15:04"}));
    assert_eq!(result.mode, ExecutionMode::Agentic);
    assert_eq!(h.provider.calls().len(), 2);
}

// S3: sticky variants are consistent per identifier.
#[tokio::test]
async fn test_variant_stickiness_per_identifier() {
    let mut provider = MockProvider::new();
    for _ in 0..20 {
        provider = provider.enqueue(LlmResponse::text(r#"{"answer":"ok"}"#));
    }
    let skill = product_skill()
        .with_variant(SkillVariant::new("A", 1))
        .with_variant(SkillVariant::new("B", 1));
    let h = harness(provider, vec![skill], |_| {});

    for user in ["user-42", "user-43"] {
        let mut seen = HashSet::new();
        for _ in 0..10 {
            let mut context = RequestContext::new();
            context.insert("userId", json!(user));
            let result = h
                .engine
                .chat(ChatRequest::new("tell me about the product").with_context(context))
                .await
                .expect("chat");
            seen.insert(result.variant.expect("variant recorded"));
        }
        assert_eq!(seen.len(), 1, "identifier {user} must pin one variant");
    }
}

// S4: schema failure terminates the turn and skips assistant persistence.
#[tokio::test]
async fn test_schema_failure_persists_no_assistant_message() {
    let provider = MockProvider::new().enqueue(LlmResponse::text(r#"{"text":"hi"}"#));
    let h = harness(provider, vec![product_skill()], |_| {});

    let err = h
        .engine
        .chat(
            ChatRequest::new("tell me about the product")
                .with_conversation_id("conv-s4"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SchemaValidation);
    assert!(err.to_string().contains("answer"));

    let conversation = h.store.get("conv-s4").await.expect("conversation");
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].role, Role::User);
}

// S5: an action requiring confirmation surfaces a suggested action.
#[tokio::test]
async fn test_action_confirmation_surfaces_suggested_action() {
    let provider = MockProvider::new().enqueue(tool_use(vec![(
        "call_1",
        "create_ticket",
        r#"{"title":"it is broken"}"#,
    )]));

    let skill = Skill::new("support", "Support")
        .with_triggers(["ticket"])
        .with_tools(["create_ticket"])
        .with_mode(ExecutionMode::Agentic)
        .with_output(answer_schema());
    let h = harness(provider, vec![skill], |tools| {
        tools.register_action(
            Action::new("create_ticket", "Create a support ticket", |_i, _c| async {
                Ok(json!({"id": "T-1"}))
            })
            .param("title", ParamDef::string("Title").required())
            .confirm_before_run(),
        );
    });

    let result = h
        .engine
        .chat(ChatRequest::new("open a ticket for me"))
        .await
        .expect("chat succeeds");

    let suggested = result.suggested_action.expect("suggested action");
    assert_eq!(suggested.tool, "create_ticket");
    assert_eq!(suggested.params["title"], json!("it is broken"));
    assert_eq!(result.response, serde_json::Value::Null);
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(h.provider.calls().len(), 1);
}

// S6: cancellation mid-tool keeps the user message, drops the assistant.
#[tokio::test]
async fn test_cancellation_mid_tool_persists_only_user_message() {
    let provider = MockProvider::new().enqueue(tool_use(vec![(
        "call_1",
        "slow_lookup",
        r#"{}"#,
    )]));

    let skill = Skill::new("assistant", "Assistant")
        .with_triggers(["look"])
        .with_tools(["slow_lookup"])
        .with_mode(ExecutionMode::Agentic);
    let h = harness(provider, vec![skill], |tools| {
        tools.register_source(Source::new("slow_lookup", "Slow lookup", |_i, _c| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({"late": true}))
        }));
    });

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = h
        .engine
        .chat_with_cancellation(
            ChatRequest::new("look this up").with_conversation_id("conv-s6"),
            cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    let conversation = h.store.get("conv-s6").await.expect("conversation");
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].role, Role::User);
}

#[tokio::test]
async fn test_mode_resolution_request_beats_skill_beats_config() {
    // Config default is expert; the skill says expert; the request says
    // agentic and must win.
    let provider = MockProvider::new()
        .enqueue(LlmResponse::text(r#"{"answer":"a"}"#))
        .enqueue(LlmResponse::text(r#"{"answer":"b"}"#));
    let skill = product_skill().with_mode(ExecutionMode::Expert);
    let h = harness(provider, vec![skill], |_| {});

    let result = h
        .engine
        .chat(ChatRequest::new("tell me about the product").with_mode(ExecutionMode::Agentic))
        .await
        .expect("chat");
    assert_eq!(result.mode, ExecutionMode::Agentic);

    let result = h
        .engine
        .chat(ChatRequest::new("tell me about the product"))
        .await
        .expect("chat");
    assert_eq!(result.mode, ExecutionMode::Expert);
}

#[tokio::test]
async fn test_empty_and_oversized_messages_are_rejected() {
    let provider = MockProvider::new();
    let h = harness(provider, vec![product_skill()], |_| {});

    let err = h.engine.chat(ChatRequest::new("   ")).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation { code: "message-empty", .. }
    ));

    let oversized = "x".repeat(10_001);
    let err = h.engine.chat(ChatRequest::new(oversized)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation { code: "too-large", .. }
    ));

    let err = h
        .engine
        .chat(ChatRequest::new("hello").with_conversation_id("../escape"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation { code: "invalid-id", .. }
    ));
}

#[tokio::test]
async fn test_routing_error_when_no_match_and_no_default() {
    let provider = MockProvider::new();
    let h = harness(provider, vec![product_skill()], |_| {});

    let err = h
        .engine
        .chat(ChatRequest::new("completely unrelated question"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Routing);
}

#[tokio::test]
async fn test_unknown_forced_skill_is_not_found() {
    let provider = MockProvider::new();
    let h = harness(provider, vec![product_skill()], |_| {});

    let err = h
        .engine
        .chat(ChatRequest::new("hello").with_skill_id("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

struct SeedingPre;

#[async_trait::async_trait]
impl PreHook for SeedingPre {
    async fn run(&self, ctx: &mut PreHookContext) -> Result<(), String> {
        ctx.data = Some(json!({"warm": "start"}));
        ctx.metadata.insert("mark".to_string(), json!("pre-was-here"));
        Ok(())
    }
}

struct StampingPost;

#[async_trait::async_trait]
impl PostHook for StampingPost {
    async fn run(&self, ctx: &mut PostHookContext) -> Result<(), String> {
        let mark = ctx.metadata.get("mark").cloned().unwrap_or_default();
        ctx.response.insert("mark".to_string(), mark);
        Ok(())
    }
}

#[tokio::test]
async fn test_hooks_seed_data_and_rewrite_response() {
    let provider = MockProvider::new().enqueue(LlmResponse::text(r#"{"answer":"ok"}"#));
    let provider = Arc::new(provider);

    let registry = SkillRegistry::new();
    registry
        .register(product_skill().with_mode(ExecutionMode::Agentic))
        .expect("register");
    let hooks = HookRegistry::new();
    hooks.register_pre("product", Arc::new(SeedingPre));
    hooks.register_post("product", Arc::new(StampingPost));

    let engine = Engine::builder()
        .provider(provider.clone())
        .skills(Arc::new(registry))
        .hooks(Arc::new(hooks))
        .build()
        .expect("engine");

    let result = engine
        .chat(ChatRequest::new("tell me about the product"))
        .await
        .expect("chat");

    // Pre-hook data landed in the prompt as an "Initial data:" message.
    let calls = provider.calls();
    assert!(calls[0]
        .messages
        .iter()
        .any(|m| m.role == "system" && m.content.starts_with("Initial data:")));
    // Post-hook saw the pre-hook metadata and rewrote the response.
    assert_eq!(result.response["mark"], json!("pre-was-here"));
    assert_eq!(result.response["answer"], json!("ok"));
}

struct FailingPre;

#[async_trait::async_trait]
impl PreHook for FailingPre {
    async fn run(&self, _ctx: &mut PreHookContext) -> Result<(), String> {
        Err("boom".to_string())
    }
}

#[tokio::test]
async fn test_hook_failure_aborts_the_turn() {
    let provider = Arc::new(MockProvider::new().enqueue(LlmResponse::text(r#"{"answer":"x"}"#)));
    let registry = SkillRegistry::new();
    registry.register(product_skill()).expect("register");
    let hooks = HookRegistry::new();
    hooks.register_pre("product", Arc::new(FailingPre));

    let engine = Engine::builder()
        .provider(provider)
        .skills(Arc::new(registry))
        .hooks(Arc::new(hooks))
        .build()
        .expect("engine");

    let err = engine
        .chat(ChatRequest::new("tell me about the product"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
    assert!(err.to_string().contains("hook failed"));
}

#[tokio::test]
async fn test_feedback_snapshot_records_variant_and_exchange() {
    let provider = MockProvider::new().enqueue(LlmResponse::text(r#"{"answer":"ok"}"#));
    let skill = product_skill()
        .with_variant(SkillVariant::new("A", 1))
        .with_variant(SkillVariant::new("B", 1));
    let h = harness(provider, vec![skill], |_| {});

    let result = h
        .engine
        .chat(ChatRequest::new("tell me about the product").with_variant("B"))
        .await
        .expect("chat");

    let feedback = h
        .engine
        .submit_feedback(
            &result.conversation_id,
            &result.message_id,
            5,
            Some("great".to_string()),
        )
        .await
        .expect("feedback");

    let snapshot = feedback.snapshot.expect("snapshot");
    assert_eq!(snapshot.user_message, "tell me about the product");
    assert!(snapshot.assistant_response.contains("ok"));
    assert_eq!(snapshot.variant.as_deref(), Some("B"));

    let stored = h.store.all_feedback();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].rating, 5);
}

#[tokio::test]
async fn test_request_timeout_maps_to_timeout_error() {
    let provider = MockProvider::new().enqueue(tool_use(vec![(
        "call_1",
        "slow_lookup",
        r#"{}"#,
    )]));
    let provider = Arc::new(provider);

    let registry = SkillRegistry::new();
    registry
        .register(
            Skill::new("assistant", "Assistant")
                .with_triggers(["look"])
                .with_tools(["slow_lookup"])
                .with_mode(ExecutionMode::Agentic),
        )
        .expect("register");
    let tools = ToolRegistry::new();
    tools.register_source(Source::new("slow_lookup", "Slow lookup", |_i, _c| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!({"late": true}))
    }));

    let mut config = EngineConfig::default();
    config.request_timeout_secs = 1;

    let engine = Engine::builder()
        .config(config)
        .provider(provider)
        .skills(Arc::new(registry))
        .tools(Arc::new(tools))
        .build()
        .expect("engine");

    let err = engine
        .chat(ChatRequest::new("look this up"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout));
}

#[tokio::test]
async fn test_conversation_accumulates_across_turns() {
    let provider = MockProvider::new()
        .enqueue(LlmResponse::text(r#"{"answer":"first"}"#))
        .enqueue(LlmResponse::text(r#"{"answer":"second"}"#));
    let h = harness(provider, vec![product_skill()], |_| {});

    let first = h
        .engine
        .chat(ChatRequest::new("tell me about the product"))
        .await
        .expect("chat");
    let second = h
        .engine
        .chat(
            ChatRequest::new("product follow-up")
                .with_conversation_id(first.conversation_id.clone()),
        )
        .await
        .expect("chat");
    assert_eq!(first.conversation_id, second.conversation_id);

    let conversation = h.store.get(&first.conversation_id).await.expect("get");
    let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    let assistant = &conversation.messages[1];
    assert_eq!(assistant.skill_id.as_deref(), Some("product"));
}
