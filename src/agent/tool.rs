//! Tool types and the process-wide tool registry.
//!
//! Provides provider-agnostic types for tool definitions, calls, and results,
//! the [`Tool`] trait implemented by each callable tool, and [`ToolRegistry`],
//! a name-keyed dispatch map that is frozen behind an `Arc` after startup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::RagError;

/// Maximum raw byte length of tool argument JSON from the LLM.
pub const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique within a registry).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call.
///
/// Always produced, even for unknown tools and timeouts, so every call in
/// the transcript has a matching tool message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Name of the tool that was requested.
    pub tool_name: String,
    /// Whether the tool completed normally.
    pub success: bool,
    /// Tool output on success, `{"error": {...}}` on failure.
    pub payload: Value,
}

impl ToolResult {
    /// Builds a successful result.
    #[must_use]
    pub fn ok(call: &ToolCall, payload: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: true,
            payload,
        }
    }

    /// Builds a failed result carrying an error payload.
    #[must_use]
    pub fn failed(call: &ToolCall, error: &RagError) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: false,
            payload: error.to_payload(),
        }
    }

    /// Renders the payload as the content of a tool message.
    #[must_use]
    pub fn content(&self) -> String {
        serde_json::to_string(&self.payload).unwrap_or_else(|_| "{}".to_string())
    }

    /// The error kind tag, if this result is a failure.
    #[must_use]
    pub fn error_kind(&self) -> Option<&str> {
        self.payload
            .get("error")
            .and_then(|e| e.get("kind"))
            .and_then(Value::as_str)
    }
}

/// A callable tool.
///
/// Handlers receive arguments that were already checked against the
/// tool's parameter schema (or replaced by `{}` when they were not valid).
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameter schema.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Returns [`RagError`] when the tool cannot produce a result; the
    /// executor turns it into an error payload.
    async fn call(&self, arguments: Value) -> Result<Value, RagError>;
}

/// Name-keyed registry of tools.
///
/// Build it once at startup, then share it read-only (`Arc<ToolRegistry>`).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its definition's name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DuplicateTool`] if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RagError> {
        let definition = tool.definition();
        if self.tools.contains_key(&definition.name) {
            return Err(RagError::DuplicateTool {
                name: definition.name,
            });
        }
        self.tools.insert(definition.name.clone(), tool);
        self.definitions.push(definition);
        Ok(())
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.definitions.iter().map(|d| d.name.as_str()).collect();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

/// Parses raw tool arguments and checks them against `schema`.
///
/// Unparsable, non-object, or schema-violating arguments are logged and
/// replaced by an empty object rather than failing the call.
#[must_use]
pub fn prepare_arguments(tool_name: &str, raw: &str, schema: &Value) -> Value {
    let empty = Value::Object(Map::new());
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return empty;
    }

    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            let err = RagError::InvalidToolArguments {
                name: tool_name.to_string(),
                message: e.to_string(),
            };
            warn!(tool = tool_name, error = %err, "falling back to empty arguments");
            return empty;
        }
    };

    match validate_arguments(&parsed, schema) {
        Ok(()) => parsed,
        Err(message) => {
            let err = RagError::InvalidToolArguments {
                name: tool_name.to_string(),
                message,
            };
            warn!(tool = tool_name, error = %err, "falling back to empty arguments");
            empty
        }
    }
}

/// Checks an argument object against the subset of JSON Schema used by
/// tool definitions: `type: object`, `required`, and primitive property types.
///
/// # Errors
///
/// Returns a description of the first violation found.
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    let Some(obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if obj.get(key).is_none_or(Value::is_null) {
                return Err(format!("missing required field '{key}'"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in obj {
        let Some(expected) = properties
            .get(key)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let matches = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            return Err(format!("field '{key}' must be of type {expected}"));
        }
    }

    Ok(())
}
