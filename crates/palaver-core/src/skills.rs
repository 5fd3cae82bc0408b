//! Skill registry.
//!
//! Skills are registered once at startup; matching is deterministic and
//! never mutates. Registration order is preserved so matching and
//! snapshots are stable across runs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::EngineError;
use crate::types::Skill;

#[derive(Default)]
struct Inner {
    skills: HashMap<String, Arc<Skill>>,
    order: Vec<String>,
}

/// Registry of skill definitions.
#[derive(Default)]
pub struct SkillRegistry {
    inner: RwLock<Inner>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill. Re-registering an id overwrites the definition
    /// but keeps its original position.
    pub fn register(&self, skill: Skill) -> Result<(), EngineError> {
        skill.validate()?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.skills.contains_key(&skill.id) {
            inner.order.push(skill.id.clone());
        }
        inner.skills.insert(skill.id.clone(), Arc::new(skill));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Skill>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .skills
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all skills in registration order.
    pub fn all(&self) -> Vec<Arc<Skill>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.skills.get(id).cloned())
            .collect()
    }

    /// Skills whose triggers or intents appear in the utterance
    /// (case-insensitive substring), in registration order, one hit per
    /// skill id.
    pub fn match_utterance(&self, utterance: &str) -> Vec<Arc<Skill>> {
        let lowered = utterance.to_lowercase();
        self.all()
            .into_iter()
            .filter(|skill| skill_matches(skill, &lowered))
            .collect()
    }

    /// Scored matching: (2·trigger hits + intent hits) / token count,
    /// clamped to [0, 1]. Results are sorted best-first; ties keep
    /// registration order.
    pub fn match_scored(&self, utterance: &str) -> Vec<(Arc<Skill>, f32)> {
        let lowered = utterance.to_lowercase();
        let token_count = lowered.split_whitespace().count().max(1) as f32;

        let mut hits: Vec<(Arc<Skill>, f32)> = self
            .all()
            .into_iter()
            .filter_map(|skill| {
                let trigger_hits = count_hits(&skill.triggers, &lowered);
                let intent_hits = count_hits(&skill.intents, &lowered);
                if trigger_hits == 0 && intent_hits == 0 {
                    return None;
                }
                let score =
                    ((2 * trigger_hits + intent_hits) as f32 / token_count).clamp(0.0, 1.0);
                Some((skill, score))
            })
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }
}

fn skill_matches(skill: &Skill, lowered_utterance: &str) -> bool {
    count_hits(&skill.triggers, lowered_utterance) > 0
        || count_hits(&skill.intents, lowered_utterance) > 0
}

fn count_hits(patterns: &[String], lowered_utterance: &str) -> usize {
    patterns
        .iter()
        .filter(|p| !p.is_empty() && lowered_utterance.contains(&p.to_lowercase()))
        .count()
}
