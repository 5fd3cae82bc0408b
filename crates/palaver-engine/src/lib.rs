//! # Palaver Engine
//!
//! The request orchestration engine. For each incoming chat turn it:
//! - routes the utterance to a skill
//! - resolves the A/B variant and assembles the prompt
//! - runs either the bounded agent loop (LM ↔ tools) or the
//!   deterministic expert path
//! - validates the LM output against the skill's declared schema
//! - runs per-skill pre/post hooks
//! - persists the dialog and returns a structured [`ChatResult`]
//!
//! [`ChatResult`]: palaver_core::types::ChatResult

mod agent_loop;
mod expert;
mod llm_router;
mod orchestrator;

pub use agent_loop::{AgentLoop, AgentLoopOutcome};
pub use expert::{
    Expert, ExpertFetcher, ExpertPostProcess, ExpertReply, ExpertRequest, SkillOutcome,
    SourceOnlyExecutor, ToolExecutor,
};
pub use llm_router::LlmRouter;
pub use orchestrator::{Engine, EngineBuilder};
