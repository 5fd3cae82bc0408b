//! LM-backed router.
//!
//! Drop-in replacement for the keyword router: the model reads the skill
//! catalog and returns `{"expert": ..., "reasoning": ...}`. On parse or
//! API failure it falls back to the default skill and records the
//! fallback reason.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use palaver_core::error::EngineError;
use palaver_core::provider::{LlmMessage, LlmRequest, Provider, ResponseFormat};
use palaver_core::router::{RouteDecision, Router, DEFAULT_ROUTE_CONFIDENCE};
use palaver_core::skills::SkillRegistry;

const ROUTER_TEMPERATURE: f32 = 0.3;
const ROUTER_MAX_TOKENS: u32 = 256;

/// Router that asks the LM to pick a skill.
pub struct LlmRouter {
    provider: Arc<dyn Provider>,
    skills: Arc<SkillRegistry>,
    default_skill_id: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct RoutedJson {
    expert: String,
    #[serde(default)]
    reasoning: String,
}

impl LlmRouter {
    pub fn new(
        provider: Arc<dyn Provider>,
        skills: Arc<SkillRegistry>,
        default_skill_id: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            skills,
            default_skill_id,
            model: model.into(),
        }
    }

    fn system_prompt(&self, entity_id: Option<&str>) -> String {
        let mut prompt = String::from(
            "You route user questions to the right skill.\n\nSkills:\n",
        );
        for skill in self.skills.all() {
            prompt.push_str(&format!(
                "- \"{}\" - {} (triggers: {}; intents: {})\n",
                skill.id,
                skill.name,
                skill.triggers.join(", "),
                skill.intents.join(", "),
            ));
        }
        match entity_id {
            Some(entity_id) => prompt.push_str(&format!("\nEntity ID: {entity_id}\n")),
            None => prompt.push_str("\nNo additional context available.\n"),
        }
        prompt.push_str(
            "\nRespond with ONLY a JSON object: {\"expert\": \"<skill id>\", \"reasoning\": \"<one sentence>\"}",
        );
        prompt
    }

    fn fallback(&self, reason: String) -> Result<Option<RouteDecision>, EngineError> {
        match self
            .default_skill_id
            .as_deref()
            .and_then(|id| self.skills.get(id))
        {
            Some(skill) => {
                warn!(reason = %reason, default_skill = %skill.id, "llm routing failed, using default skill");
                Ok(Some(RouteDecision {
                    skill,
                    confidence: DEFAULT_ROUTE_CONFIDENCE,
                    reasoning: Some(reason),
                }))
            }
            None => Err(EngineError::Routing(reason)),
        }
    }
}

#[async_trait]
impl Router for LlmRouter {
    async fn route(
        &self,
        utterance: &str,
        entity_id: Option<&str>,
    ) -> Result<Option<RouteDecision>, EngineError> {
        let request = LlmRequest {
            model: self.model.clone(),
            messages: vec![
                LlmMessage::system(self.system_prompt(entity_id)),
                LlmMessage::user(utterance),
            ],
            tools: Vec::new(),
            response_format: Some(ResponseFormat::JsonObject),
            temperature: ROUTER_TEMPERATURE,
            max_tokens: ROUTER_MAX_TOKENS,
        };

        let response = match self.provider.chat(request).await {
            Ok(response) => response,
            Err(err) => return self.fallback(format!("routing call failed: {err}")),
        };

        let parsed: RoutedJson = match serde_json::from_str(&response.content) {
            Ok(parsed) => parsed,
            Err(err) => return self.fallback(format!("routing output was not valid JSON: {err}")),
        };

        let Some(skill) = self.skills.get(&parsed.expert) else {
            return self.fallback(format!("router picked unknown skill '{}'", parsed.expert));
        };

        debug!(skill_id = %skill.id, reasoning = %parsed.reasoning, "llm router decision");
        Ok(Some(RouteDecision {
            skill,
            confidence: 1.0,
            reasoning: (!parsed.reasoning.is_empty()).then_some(parsed.reasoning),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::provider::LlmResponse;
    use palaver_core::types::Skill;
    use palaver_providers::MockProvider;

    fn skills() -> Arc<SkillRegistry> {
        let registry = SkillRegistry::new();
        registry
            .register(Skill::new("product", "Product").with_triggers(["product"]))
            .expect("register");
        registry
            .register(Skill::new("general", "General"))
            .expect("register");
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_routes_to_skill_the_model_picked() {
        let provider = Arc::new(MockProvider::new().enqueue(LlmResponse::text(
            r#"{"expert":"product","reasoning":"asks about a product"}"#,
        )));
        let router = LlmRouter::new(provider.clone(), skills(), None, "gpt-4o-mini");

        let decision = router
            .route("tell me about the widget", None)
            .await
            .expect("route")
            .expect("decision");
        assert_eq!(decision.skill.id, "product");
        assert_eq!(decision.reasoning.as_deref(), Some("asks about a product"));

        let calls = provider.calls();
        assert!(calls[0].messages[0].content.contains("\"product\""));
    }

    #[tokio::test]
    async fn test_falls_back_to_default_on_parse_failure() {
        let provider =
            Arc::new(MockProvider::new().enqueue(LlmResponse::text("no json here")));
        let router = LlmRouter::new(
            provider,
            skills(),
            Some("general".to_string()),
            "gpt-4o-mini",
        );

        let decision = router
            .route("anything", None)
            .await
            .expect("route")
            .expect("decision");
        assert_eq!(decision.skill.id, "general");
        assert_eq!(decision.confidence, DEFAULT_ROUTE_CONFIDENCE);
        assert!(decision
            .reasoning
            .as_deref()
            .is_some_and(|r| r.contains("not valid JSON")));
    }

    #[tokio::test]
    async fn test_unknown_pick_without_default_is_a_routing_error() {
        let provider = Arc::new(
            MockProvider::new()
                .enqueue(LlmResponse::text(r#"{"expert":"made-up","reasoning":""}"#)),
        );
        let router = LlmRouter::new(provider, skills(), None, "gpt-4o-mini");

        let err = router.route("anything", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Routing(_)));
    }

    #[tokio::test]
    async fn test_api_failure_without_scripted_response_falls_back() {
        // An empty mock errors on every call, standing in for an API failure.
        let provider = Arc::new(MockProvider::new());
        let router = LlmRouter::new(
            provider,
            skills(),
            Some("general".to_string()),
            "gpt-4o-mini",
        );

        let decision = router
            .route("anything", None)
            .await
            .expect("route")
            .expect("decision");
        assert_eq!(decision.skill.id, "general");
    }
}
