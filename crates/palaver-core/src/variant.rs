//! A/B variant selection.
//!
//! Exactly one variant is selected per request; the chosen variant id is
//! recorded on the assistant message so conversion can be analysed per
//! variant off-line.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::types::{Skill, SkillVariant};

/// The variant resolved for one request. `id` is `None` when the skill
/// declares no variants; `instructions` always carries the effective
/// instruction block (variant override or the skill's own).
#[derive(Debug, Clone)]
pub struct SelectedVariant {
    pub id: Option<String>,
    pub instructions: String,
}

impl SelectedVariant {
    fn synthetic(skill: &Skill) -> Self {
        Self {
            id: None,
            instructions: skill.instructions.clone(),
        }
    }

    fn from_variant(skill: &Skill, variant: &SkillVariant) -> Self {
        let instructions = if variant.instructions.is_empty() {
            skill.instructions.clone()
        } else {
            variant.instructions.clone()
        };
        Self {
            id: Some(variant.id.clone()),
            instructions,
        }
    }
}

/// Selection policy.
#[derive(Debug, Clone)]
pub enum VariantPolicy {
    /// Probability proportional to weight.
    Weighted,
    /// Deterministic per identifier: same identifier means the same
    /// variant across process restarts. Falls back to weighted when no
    /// identifier is available.
    Sticky,
    /// Always the named variant; the first one if absent.
    Fixed(String),
}

/// Variant selector. Thread-safe; sticky selection is deterministic and
/// does not touch the RNG.
pub struct VariantSelector {
    policy: VariantPolicy,
    rng: Mutex<StdRng>,
}

impl VariantSelector {
    pub fn new(policy: VariantPolicy) -> Self {
        Self {
            policy,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Fixed-seed constructor for reproducible tests.
    pub fn with_seed(policy: VariantPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Resolve exactly one variant. A caller-requested id wins when it
    /// exists; a skill without variants yields the synthetic default.
    pub fn select(
        &self,
        skill: &Skill,
        requested: Option<&str>,
        identifier: Option<&str>,
    ) -> SelectedVariant {
        if let Some(requested) = requested {
            if let Some(variant) = skill.variants.iter().find(|v| v.id == requested) {
                return SelectedVariant::from_variant(skill, variant);
            }
        }

        if skill.variants.is_empty() {
            return SelectedVariant::synthetic(skill);
        }

        let variant = match &self.policy {
            VariantPolicy::Fixed(name) => skill
                .variants
                .iter()
                .find(|v| &v.id == name)
                .unwrap_or(&skill.variants[0]),
            VariantPolicy::Sticky => match identifier {
                Some(identifier) => sticky_pick(skill, identifier),
                None => self.weighted_pick(skill),
            },
            VariantPolicy::Weighted => self.weighted_pick(skill),
        };

        SelectedVariant::from_variant(skill, variant)
    }

    fn weighted_pick<'a>(&self, skill: &'a Skill) -> &'a SkillVariant {
        let total = total_weight(&skill.variants);
        let target = {
            let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            rng.gen_range(0..total)
        };
        walk_cumulative(&skill.variants, target)
    }
}

fn effective_weight(variant: &SkillVariant) -> u64 {
    if variant.weight <= 0 {
        1
    } else {
        variant.weight as u64
    }
}

fn total_weight(variants: &[SkillVariant]) -> u64 {
    variants.iter().map(effective_weight).sum::<u64>().max(1)
}

fn walk_cumulative(variants: &[SkillVariant], target: u64) -> &SkillVariant {
    let mut cumulative = 0;
    for variant in variants {
        cumulative += effective_weight(variant);
        if target < cumulative {
            return variant;
        }
    }
    &variants[0]
}

/// hash(identifier ‖ skill id) mod total weight, then walk the
/// cumulative-weight table.
fn sticky_pick<'a>(skill: &'a Skill, identifier: &str) -> &'a SkillVariant {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hasher.update(skill.id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let target = u64::from_be_bytes(prefix) % total_weight(&skill.variants);
    walk_cumulative(&skill.variants, target)
}
