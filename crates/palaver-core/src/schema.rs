//! Schema rendering and response validation.
//!
//! Declared output schemas and tool parameter tables are rendered to
//! JSON-Schema at prompt-build time; LM output is validated against the
//! declared schema on the way out. The validator never mutates the
//! response.

use serde_json::{json, Map, Value};

use crate::error::EngineError;
use crate::tool::ParamDef;
use crate::types::{OutputSchema, PropertySchema};

/// Render a tool parameter table to JSON-Schema, preserving declaration
/// order.
pub fn params_to_json_schema(params: &[(String, ParamDef)]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (name, def) in params {
        let mut prop = Map::new();
        prop.insert("type".to_string(), json!(def.kind.json_type()));
        prop.insert("description".to_string(), json!(def.description));
        if !def.enum_values.is_empty() {
            prop.insert("enum".to_string(), json!(def.enum_values));
        }
        properties.insert(name.clone(), Value::Object(prop));
        if def.required {
            required.push(name.clone());
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    Value::Object(schema)
}

/// Render a declared output schema to JSON-Schema with
/// `additionalProperties: false` at every object level.
pub fn output_schema_to_json_schema(schema: &OutputSchema) -> Value {
    let mut properties = Map::new();
    for prop in &schema.properties {
        properties.insert(prop.name.clone(), property_to_json_schema(&prop.schema));
    }

    let mut rendered = Map::new();
    rendered.insert("type".to_string(), json!(schema.kind));
    rendered.insert("properties".to_string(), Value::Object(properties));
    if !schema.required.is_empty() {
        rendered.insert("required".to_string(), json!(schema.required));
    }
    rendered.insert("additionalProperties".to_string(), json!(false));
    Value::Object(rendered)
}

fn property_to_json_schema(prop: &PropertySchema) -> Value {
    let mut rendered = Map::new();
    rendered.insert("type".to_string(), json!(prop.kind));
    if let Some(description) = &prop.description {
        rendered.insert("description".to_string(), json!(description));
    }
    if let Some(items) = &prop.items {
        rendered.insert("items".to_string(), property_to_json_schema(items));
    }
    if !prop.properties.is_empty() {
        let mut nested = Map::new();
        for child in &prop.properties {
            nested.insert(child.name.clone(), property_to_json_schema(&child.schema));
        }
        rendered.insert("properties".to_string(), Value::Object(nested));
        rendered.insert("additionalProperties".to_string(), json!(false));
    }
    if !prop.enum_values.is_empty() {
        rendered.insert("enum".to_string(), json!(prop.enum_values));
    }
    Value::Object(rendered)
}

/// Validate raw LM content against the skill's declared schema.
///
/// Without a schema any content is accepted unchanged (returned as a JSON
/// string value when it does not parse). With a schema the content must
/// parse as JSON, carry every required field, and conform structurally.
pub fn validate_response(
    schema: Option<&OutputSchema>,
    raw: &str,
) -> Result<Value, EngineError> {
    let Some(schema) = schema else {
        return Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())));
    };

    let value: Value = serde_json::from_str(raw).map_err(|e| {
        EngineError::SchemaValidation(format!("response is not valid JSON: {e}"))
    })?;

    let object = value.as_object().ok_or_else(|| {
        EngineError::SchemaValidation("response is not a JSON object".to_string())
    })?;

    for name in &schema.required {
        if !object.contains_key(name) {
            return Err(EngineError::SchemaValidation(format!(
                "missing required field '{name}'"
            )));
        }
    }

    for prop in &schema.properties {
        if let Some(child) = object.get(&prop.name) {
            validate_property(child, &prop.schema, &prop.name)?;
        }
    }

    Ok(value)
}

fn validate_property(value: &Value, schema: &PropertySchema, path: &str) -> Result<(), EngineError> {
    if !type_matches(value, &schema.kind) {
        return Err(EngineError::SchemaValidation(format!(
            "field '{path}' expected type '{}'",
            schema.kind
        )));
    }

    if !schema.enum_values.is_empty() {
        let matched = value
            .as_str()
            .map(|s| schema.enum_values.iter().any(|v| v == s))
            .unwrap_or(false);
        if !matched {
            return Err(EngineError::SchemaValidation(format!(
                "field '{path}' is not one of the allowed enum values"
            )));
        }
    }

    if let Some(items) = &schema.items {
        if let Some(array) = value.as_array() {
            for (idx, item) in array.iter().enumerate() {
                validate_property(item, items, &format!("{path}[{idx}]"))?;
            }
        }
    }

    if !schema.properties.is_empty() {
        let object = value.as_object().ok_or_else(|| {
            EngineError::SchemaValidation(format!("field '{path}' must be an object"))
        })?;
        for child in &schema.properties {
            if let Some(child_value) = object.get(&child.name) {
                validate_property(child_value, &child.schema, &format!("{path}.{}", child.name))?;
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, kind: &str) -> bool {
    match kind {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
