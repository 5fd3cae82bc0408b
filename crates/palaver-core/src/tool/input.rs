//! Typed view over untyped tool parameters.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::tool::ParamDef;

/// Accessor view over the JSON parameters of one tool call. Declared
/// per-param defaults are folded in when a parameter is absent.
#[derive(Debug, Clone)]
pub struct ToolInput {
    params: Map<String, Value>,
    defaults: HashMap<String, Value>,
}

impl ToolInput {
    pub fn new(params: Map<String, Value>, defs: &[(String, ParamDef)]) -> Self {
        let defaults = defs
            .iter()
            .filter_map(|(name, def)| def.default.clone().map(|v| (name.clone(), v)))
            .collect();
        Self { params, defaults }
    }

    /// Raw parameter or declared default.
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.params.get(name).or_else(|| self.defaults.get(name))
    }

    pub fn string(&self, name: &str) -> String {
        self.string_or(name, "")
    }

    pub fn string_or(&self, name: &str, default: &str) -> String {
        self.lookup(name)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    pub fn int(&self, name: &str) -> i64 {
        self.int_or(name, 0)
    }

    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.lookup(name)
            .and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_f64().map(|f| f as i64))
            })
            .unwrap_or(default)
    }

    pub fn bool(&self, name: &str) -> bool {
        self.bool_or(name, false)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.lookup(name).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn object(&self, name: &str) -> Option<&Map<String, Value>> {
        self.lookup(name).and_then(|v| v.as_object())
    }

    pub fn array(&self, name: &str) -> Option<&Vec<Value>> {
        self.lookup(name).and_then(|v| v.as_array())
    }

    /// The raw value, without default folding.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Whether the caller provided this parameter.
    pub fn has(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}
