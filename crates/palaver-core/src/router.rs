//! Skill routing.
//!
//! The router contract is deliberately small so the keyword matcher and
//! the LM-backed router (in `palaver-engine`) are interchangeable via
//! configuration.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::skills::SkillRegistry;
use crate::types::Skill;

/// Confidence reported when the router falls back to the default skill.
pub const DEFAULT_ROUTE_CONFIDENCE: f32 = 0.1;

/// A routing decision.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub skill: Arc<Skill>,
    pub confidence: f32,
    /// Why this skill was chosen; populated by the LM router, and by any
    /// router when it falls back to the default.
    pub reasoning: Option<String>,
}

/// Router contract: pick at most one skill for an utterance.
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(
        &self,
        utterance: &str,
        entity_id: Option<&str>,
    ) -> Result<Option<RouteDecision>, EngineError>;
}

/// Deterministic keyword/intent router backed by the skill registry.
pub struct KeywordRouter {
    skills: Arc<SkillRegistry>,
    default_skill_id: Option<String>,
}

impl KeywordRouter {
    pub fn new(skills: Arc<SkillRegistry>, default_skill_id: Option<String>) -> Self {
        Self {
            skills,
            default_skill_id,
        }
    }

    fn default_decision(&self) -> Option<RouteDecision> {
        let id = self.default_skill_id.as_deref()?;
        let skill = self.skills.get(id)?;
        Some(RouteDecision {
            skill,
            confidence: DEFAULT_ROUTE_CONFIDENCE,
            reasoning: Some("no trigger or intent matched; using default skill".to_string()),
        })
    }
}

#[async_trait]
impl Router for KeywordRouter {
    async fn route(
        &self,
        utterance: &str,
        _entity_id: Option<&str>,
    ) -> Result<Option<RouteDecision>, EngineError> {
        let mut hits = self.skills.match_scored(utterance);
        if let Some((skill, confidence)) = hits.drain(..).next() {
            return Ok(Some(RouteDecision {
                skill,
                confidence,
                reasoning: None,
            }));
        }
        Ok(self.default_decision())
    }
}
