//! Per-skill pre/post processing hooks.
//!
//! A pre-hook runs before the LM path and may rewrite fetched data
//! (expert mode) or seed initial data (agent mode). A post-hook runs on
//! the final response map and may rewrite it; the engine re-serialises
//! the mutated map as the new response. The metadata bag is shared from
//! pre to post within one request and never crosses request boundaries.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::types::{RequestContext, TokenUsage};

/// State visible to a pre-hook.
#[derive(Debug)]
pub struct PreHookContext {
    pub skill_id: String,
    pub message: String,
    /// Fetched data in expert mode, `None` in agent mode; a hook may
    /// replace or seed it.
    pub data: Option<Value>,
    pub context: RequestContext,
    /// Scratch values forwarded to the post-hook.
    pub metadata: HashMap<String, Value>,
}

/// State visible to a post-hook.
#[derive(Debug)]
pub struct PostHookContext {
    pub skill_id: String,
    pub message: String,
    /// Parsed response map; mutations become the new response.
    pub response: Map<String, Value>,
    pub data: Option<Value>,
    pub context: RequestContext,
    pub metadata: HashMap<String, Value>,
    pub variant: Option<String>,
    pub usage: TokenUsage,
}

/// Pre-processing interceptor.
#[async_trait]
pub trait PreHook: Send + Sync {
    async fn run(&self, ctx: &mut PreHookContext) -> Result<(), String>;
}

/// Post-processing interceptor.
#[async_trait]
pub trait PostHook: Send + Sync {
    async fn run(&self, ctx: &mut PostHookContext) -> Result<(), String>;
}

/// Per-skill hook registry: zero or one hook of each kind per skill id.
#[derive(Default)]
pub struct HookRegistry {
    pre: RwLock<HashMap<String, Arc<dyn PreHook>>>,
    post: RwLock<HashMap<String, Arc<dyn PostHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pre(&self, skill_id: impl Into<String>, hook: Arc<dyn PreHook>) {
        self.pre
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(skill_id.into(), hook);
    }

    pub fn register_post(&self, skill_id: impl Into<String>, hook: Arc<dyn PostHook>) {
        self.post
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(skill_id.into(), hook);
    }

    pub fn pre(&self, skill_id: &str) -> Option<Arc<dyn PreHook>> {
        self.pre
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(skill_id)
            .cloned()
    }

    pub fn post(&self, skill_id: &str) -> Option<Arc<dyn PostHook>> {
        self.post
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(skill_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct SeedingPre;

    #[async_trait]
    impl PreHook for SeedingPre {
        async fn run(&self, ctx: &mut PreHookContext) -> Result<(), String> {
            ctx.data = Some(json!({"seeded": true}));
            ctx.metadata.insert("mark".to_string(), json!("from-pre"));
            Ok(())
        }
    }

    struct RewritingPost;

    #[async_trait]
    impl PostHook for RewritingPost {
        async fn run(&self, ctx: &mut PostHookContext) -> Result<(), String> {
            let mark = ctx.metadata.get("mark").cloned().unwrap_or(Value::Null);
            ctx.response.insert("mark".to_string(), mark);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_metadata_flows_from_pre_to_post() {
        let registry = HookRegistry::new();
        registry.register_pre("product", Arc::new(SeedingPre));
        registry.register_post("product", Arc::new(RewritingPost));

        let mut pre_ctx = PreHookContext {
            skill_id: "product".to_string(),
            message: "hi".to_string(),
            data: None,
            context: RequestContext::new(),
            metadata: HashMap::new(),
        };
        registry
            .pre("product")
            .expect("pre hook")
            .run(&mut pre_ctx)
            .await
            .expect("pre ok");
        assert_eq!(pre_ctx.data, Some(json!({"seeded": true})));

        let mut post_ctx = PostHookContext {
            skill_id: "product".to_string(),
            message: "hi".to_string(),
            response: Map::new(),
            data: pre_ctx.data.clone(),
            context: pre_ctx.context.clone(),
            metadata: pre_ctx.metadata,
            variant: None,
            usage: TokenUsage::default(),
        };
        registry
            .post("product")
            .expect("post hook")
            .run(&mut post_ctx)
            .await
            .expect("post ok");
        assert_eq!(post_ctx.response["mark"], json!("from-pre"));
    }

    #[test]
    fn test_unregistered_skill_has_no_hooks() {
        let registry = HookRegistry::new();
        assert!(registry.pre("unknown").is_none());
        assert!(registry.post("unknown").is_none());
    }
}
