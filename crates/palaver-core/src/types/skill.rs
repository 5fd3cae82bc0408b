//! Skill definitions.
//!
//! A skill is a declarative bundle (instructions + examples + schema +
//! tool names) that defines how one category of questions is answered.
//! Skills are loaded once at startup and immutable thereafter.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::ExecutionMode;

/// A skill definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    /// Stable identifier, unique per registry.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Keywords that activate this skill.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Semantic intents that activate this skill.
    #[serde(default)]
    pub intents: Vec<String>,
    /// Names of tools this skill may use.
    #[serde(default)]
    pub tools: Vec<String>,
    /// System instructions for the LM.
    #[serde(default)]
    pub instructions: String,
    /// Ordered few-shot examples.
    #[serde(default)]
    pub examples: Vec<SkillExample>,
    /// Free-text rules the LM must follow.
    #[serde(default)]
    pub guardrails: Vec<String>,
    /// Declared response schema; absent means free-form output.
    #[serde(default)]
    pub output: Option<OutputSchema>,
    /// Ordered A/B variants.
    #[serde(default)]
    pub variants: Vec<SkillVariant>,
    /// Per-skill execution mode override.
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
    /// Request-context keys to splice into the system prompt.
    #[serde(default)]
    pub context_keys: Vec<String>,
}

impl Skill {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            triggers: Vec::new(),
            intents: Vec::new(),
            tools: Vec::new(),
            instructions: String::new(),
            examples: Vec::new(),
            guardrails: Vec::new(),
            output: None,
            variants: Vec::new(),
            mode: None,
            context_keys: Vec::new(),
        }
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_intents<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intents = intents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_example(mut self, user: impl Into<String>, assistant: impl Into<String>) -> Self {
        self.examples.push(SkillExample {
            user: user.into(),
            assistant: assistant.into(),
        });
        self
    }

    pub fn with_guardrail(mut self, rule: impl Into<String>) -> Self {
        self.guardrails.push(rule.into());
        self
    }

    pub fn with_output(mut self, schema: OutputSchema) -> Self {
        self.output = Some(schema);
        self
    }

    pub fn with_variant(mut self, variant: SkillVariant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_context_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Check the registration invariants.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.is_empty() {
            return Err(EngineError::Configuration(
                "skill id must not be empty".to_string(),
            ));
        }
        if !self.variants.is_empty() && !self.variants.iter().any(|v| v.weight > 0) {
            return Err(EngineError::Configuration(format!(
                "skill '{}' declares variants but none has positive weight",
                self.id
            )));
        }
        Ok(())
    }
}

/// A few-shot example, rendered as a user/assistant message pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillExample {
    pub user: String,
    pub assistant: String,
}

/// An A/B testing arm of a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillVariant {
    /// Variant identifier, unique within the skill.
    pub id: String,
    /// Selection weight; non-positive weights are treated as 1.
    #[serde(default)]
    pub weight: i32,
    /// Overrides the skill's base instructions when non-empty.
    #[serde(default)]
    pub instructions: String,
}

impl SkillVariant {
    pub fn new(id: impl Into<String>, weight: i32) -> Self {
        Self {
            id: id.into(),
            weight,
            instructions: String::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// Declarative response schema. Property order follows declaration order,
/// which is preserved through the JSON-Schema rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Top-level type, normally "object".
    #[serde(rename = "type", default = "default_object_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Vec<SchemaProperty>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn default_object_type() -> String {
    "object".to_string()
}

impl OutputSchema {
    pub fn object() -> Self {
        Self {
            kind: default_object_type(),
            properties: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.push(SchemaProperty {
            name: name.into(),
            schema,
        });
        self
    }

    pub fn require<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.schema)
    }
}

/// A named property inside an [`OutputSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaProperty {
    pub name: String,
    #[serde(flatten)]
    pub schema: PropertySchema,
}

/// One property in the output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Element schema for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    /// Nested properties for objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<SchemaProperty>,
    /// Allowed values for string enums.
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl PropertySchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: None,
            items: None,
            properties: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::new("string")
    }

    pub fn integer() -> Self {
        Self::new("integer")
    }

    pub fn number() -> Self {
        Self::new("number")
    }

    pub fn boolean() -> Self {
        Self::new("boolean")
    }

    pub fn object() -> Self {
        Self::new("object")
    }

    pub fn array_of(items: PropertySchema) -> Self {
        let mut schema = Self::new("array");
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn string_enum<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::new("string");
        schema.enum_values = values.into_iter().map(Into::into).collect();
        schema
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.push(SchemaProperty {
            name: name.into(),
            schema,
        });
        self
    }
}
