//! Tool abstraction module.
//!
//! A tool is a callable exposed to the LM. There are two kinds:
//! - [`Source`]: read-only data fetching
//! - [`Action`]: side-effecting, optionally gated behind user confirmation
//!
//! Tools carry an ordered parameter table that is rendered to JSON-Schema
//! for the LM and folded into the [`ToolInput`] view for executors.

mod input;
mod registry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use input::ToolInput;
pub use registry::{ParamInfo, ToolRegistry};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

use crate::provider::ToolDefinition;
use crate::schema::params_to_json_schema;

/// Parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Int,
    Bool,
    Object,
    Array,
    Enum,
}

impl ParamKind {
    /// JSON-Schema type name.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String | Self::Enum => "string",
            Self::Int => "integer",
            Self::Bool => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// A tool parameter definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub kind: ParamKind,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamDef {
    pub fn new(kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            required: false,
            enum_values: Vec::new(),
            default: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamKind::String, description)
    }

    pub fn int(description: impl Into<String>) -> Self {
        Self::new(ParamKind::Int, description)
    }

    pub fn bool(description: impl Into<String>) -> Self {
        Self::new(ParamKind::Bool, description)
    }

    pub fn object(description: impl Into<String>) -> Self {
        Self::new(ParamKind::Object, description)
    }

    pub fn array(description: impl Into<String>) -> Self {
        Self::new(ParamKind::Array, description)
    }

    pub fn string_enum<I, S>(description: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut def = Self::new(ParamKind::Enum, description);
        def.enum_values = values.into_iter().map(Into::into).collect();
        def
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Execution context handed to tool executors.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub conversation_id: Option<String>,
    pub entity_id: Option<String>,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Read-only tool executor.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, String>;
}

/// Side-effecting tool executor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, String>;
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> SourceFetcher for FnExecutor<F>
where
    F: Fn(ToolInput, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn fetch(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, String> {
        (self.0)(input, ctx).await
    }
}

#[async_trait]
impl<F, Fut> ActionExecutor for FnExecutor<F>
where
    F: Fn(ToolInput, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn execute(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, String> {
        (self.0)(input, ctx).await
    }
}

/// A read-only data source tool.
#[derive(Clone)]
pub struct Source {
    pub name: String,
    pub description: String,
    /// Parameter table in declaration order.
    pub params: Vec<(String, ParamDef)>,
    fetcher: Arc<dyn SourceFetcher>,
}

impl Source {
    /// Create a source from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, fetch: F) -> Self
    where
        F: Fn(ToolInput, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self::with_fetcher(name, description, Arc::new(FnExecutor(fetch)))
    }

    /// Create a source from a fetcher object.
    pub fn with_fetcher(
        name: impl Into<String>,
        description: impl Into<String>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            fetcher,
        }
    }

    /// Declare a parameter. Redeclaring a name replaces the earlier entry.
    pub fn param(mut self, name: impl Into<String>, def: ParamDef) -> Self {
        let name = name.into();
        self.params.retain(|(existing, _)| existing != &name);
        self.params.push((name, def));
        self
    }

    pub async fn fetch(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, String> {
        self.fetcher.fetch(input, ctx).await
    }

    /// Definition exposed to the LM.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: params_to_json_schema(&self.params),
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish()
    }
}

/// A side-effecting tool.
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub description: String,
    /// Parameter table in declaration order.
    pub params: Vec<(String, ParamDef)>,
    /// When set, the agent loop never executes this action inline; it
    /// surfaces a suggested action for the user to confirm instead.
    pub requires_confirmation: bool,
    executor: Arc<dyn ActionExecutor>,
}

impl Action {
    /// Create an action from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, execute: F) -> Self
    where
        F: Fn(ToolInput, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self::with_executor(name, description, Arc::new(FnExecutor(execute)))
    }

    /// Create an action from an executor object.
    pub fn with_executor(
        name: impl Into<String>,
        description: impl Into<String>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            requires_confirmation: false,
            executor,
        }
    }

    /// Declare a parameter. Redeclaring a name replaces the earlier entry.
    pub fn param(mut self, name: impl Into<String>, def: ParamDef) -> Self {
        let name = name.into();
        self.params.retain(|(existing, _)| existing != &name);
        self.params.push((name, def));
        self
    }

    pub fn confirm_before_run(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub async fn execute(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, String> {
        self.executor.execute(input, ctx).await
    }

    /// Definition exposed to the LM.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: params_to_json_schema(&self.params),
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("requires_confirmation", &self.requires_confirmation)
            .field("params", &self.params.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_definition_renders_param_schema() {
        let source = Source::new("get_weather", "Current weather", |_input, _ctx| async {
            Ok(json!({"temp": 18}))
        })
        .param("city", ParamDef::string("City name").required())
        .param(
            "unit",
            ParamDef::string_enum("Temperature unit", ["celsius", "fahrenheit"]),
        );

        let def = source.definition();
        assert_eq!(def.name, "get_weather");
        assert_eq!(def.parameters["type"], json!("object"));
        assert_eq!(
            def.parameters["properties"]["city"]["type"],
            json!("string")
        );
        assert_eq!(
            def.parameters["properties"]["unit"]["enum"],
            json!(["celsius", "fahrenheit"])
        );
        assert_eq!(def.parameters["required"], json!(["city"]));
    }

    #[test]
    fn test_param_redeclaration_replaces_earlier_entry() {
        let action = Action::new("create_ticket", "Create a ticket", |_input, _ctx| async {
            Ok(json!({"ok": true}))
        })
        .param("title", ParamDef::string("old"))
        .param("title", ParamDef::string("new").required());

        assert_eq!(action.params.len(), 1);
        assert!(action.params[0].1.required);
        assert_eq!(action.params[0].1.description, "new");
    }

    #[test]
    fn test_action_executes_closure() {
        tokio_test::block_on(async {
            let action = Action::new("echo", "Echo input", |input: ToolInput, _ctx| async move {
                Ok(json!({ "echoed": input.string("text") }))
            })
            .param("text", ParamDef::string("Text to echo"));

            let mut params = serde_json::Map::new();
            params.insert("text".to_string(), json!("hi"));
            let input = ToolInput::new(params, &action.params);
            let out = action.execute(input, ToolContext::new()).await.unwrap();
            assert_eq!(out, json!({"echoed": "hi"}));
        });
    }
}
