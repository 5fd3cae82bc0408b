//! Tool registry.
//!
//! Holds sources and actions in separate name maps. Registration happens
//! at startup; lookup and execution are the hot path and take the reader
//! side of the guard.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::provider::ToolDefinition;
use crate::tool::{Action, Source, ToolContext, ToolInput};

/// Flattened information about one tool parameter, used by the prompt
/// assembler to know which context keys the LM will recognise.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub description: String,
    pub required: bool,
    /// First tool (by name order, sources before actions) defining the
    /// parameter.
    pub tool_name: String,
}

/// Registry of sources and actions.
#[derive(Default)]
pub struct ToolRegistry {
    sources: RwLock<HashMap<String, Arc<Source>>>,
    actions: RwLock<HashMap<String, Arc<Action>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; re-registering a name overwrites it.
    pub fn register_source(&self, source: Source) {
        let mut sources = self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sources.insert(source.name.clone(), Arc::new(source));
    }

    /// Register an action; re-registering a name overwrites it.
    pub fn register_action(&self, action: Action) {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        actions.insert(action.name.clone(), Arc::new(action));
    }

    pub fn source(&self, name: &str) -> Option<Arc<Source>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn action(&self, name: &str) -> Option<Arc<Action>> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshot of all sources, arbitrary order.
    pub fn all_sources(&self) -> Vec<Arc<Source>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of all actions, arbitrary order.
    pub fn all_actions(&self) -> Vec<Arc<Action>> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Partition a skill's tool names into sources and actions. Fails on
    /// the first name not resolvable in either map.
    pub fn resolve_for_skill(
        &self,
        names: &[String],
    ) -> Result<(Vec<Arc<Source>>, Vec<Arc<Action>>), EngineError> {
        let mut sources = Vec::new();
        let mut actions = Vec::new();
        for name in names {
            if let Some(source) = self.source(name) {
                sources.push(source);
            } else if let Some(action) = self.action(name) {
                actions.push(action);
            } else {
                return Err(EngineError::not_found("tool", name.clone()));
            }
        }
        Ok((sources, actions))
    }

    /// Locate a tool by name in either map, build its input view and
    /// invoke the executor.
    pub async fn execute(
        &self,
        name: &str,
        params: Map<String, Value>,
        ctx: ToolContext,
    ) -> Result<Value, EngineError> {
        if let Some(source) = self.source(name) {
            let input = ToolInput::new(params, &source.params);
            return source
                .fetch(input, ctx)
                .await
                .map_err(|message| EngineError::tool(name, message));
        }
        if let Some(action) = self.action(name) {
            let input = ToolInput::new(params, &action.params);
            return action
                .execute(input, ctx)
                .await
                .map_err(|message| EngineError::tool(name, message));
        }
        Err(EngineError::not_found("tool", name))
    }

    /// LM definitions for every registered tool, sources before actions,
    /// each group sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut sources = self.all_sources();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        let mut actions = self.all_actions();
        actions.sort_by(|a, b| a.name.cmp(&b.name));

        sources
            .iter()
            .map(|s| s.definition())
            .chain(actions.iter().map(|a| a.definition()))
            .collect()
    }

    /// Flattened map of parameter name → info across all tools. On name
    /// collision the first definition wins unless a later one is required
    /// and the kept one is not.
    pub fn parameter_index(&self) -> HashMap<String, ParamInfo> {
        let mut index: HashMap<String, ParamInfo> = HashMap::new();

        let mut sources = self.all_sources();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        let mut actions = self.all_actions();
        actions.sort_by(|a, b| a.name.cmp(&b.name));

        let tables = sources
            .iter()
            .map(|s| (s.name.as_str(), &s.params))
            .chain(actions.iter().map(|a| (a.name.as_str(), &a.params)));

        for (tool_name, params) in tables {
            for (param_name, def) in params.iter() {
                let candidate = ParamInfo {
                    name: param_name.clone(),
                    description: def.description.clone(),
                    required: def.required,
                    tool_name: tool_name.to_string(),
                };
                match index.get(param_name) {
                    Some(existing) if existing.required || !def.required => {}
                    _ => {
                        index.insert(param_name.clone(), candidate);
                    }
                }
            }
        }
        index
    }
}
