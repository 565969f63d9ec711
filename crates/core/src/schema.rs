//! Argument validation against a tool's parameter schema.
//!
//! Schemas are standard JSON Schema (Draft 7). Conditional requirements,
//! such as `url` being mandatory when `action` is `"go_to_url"`, are written
//! as `allOf` entries of `if`/`then` pairs.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::ToolError;

/// Validate `args` against `schema`.
///
/// Top-level arguments whose value is `null` are treated as absent.
/// Properties not mentioned in the schema are allowed unless the schema
/// says otherwise.
pub fn validate(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid parameter schema: {e}")))?;

    let args = without_nulls(args);
    if let Err(errors) = compiled.validate(&args) {
        let messages: Vec<String> = errors
            .map(|err| {
                let path = err.instance_path.to_string();
                if path.is_empty() {
                    err.to_string()
                } else {
                    format!("{path}: {err}")
                }
            })
            .collect();
        let message = if messages.is_empty() {
            "arguments do not match the parameter schema".to_string()
        } else {
            messages.join("; ")
        };
        return Err(ToolError::InvalidArguments(message));
    }
    Ok(())
}

fn without_nulls(args: &Value) -> Value {
    match args {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}
