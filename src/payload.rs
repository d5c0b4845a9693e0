// Normalisation of loosely shaped tool-call requests
use serde_json::{Map, Value};

use crate::errors::{McpClientError, Result};

/// A call request as callers hand it over: a JSON object or raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Structured(Map<String, Value>),
    Text(String),
}

impl From<Map<String, Value>> for ToolPayload {
    fn from(map: Map<String, Value>) -> Self {
        ToolPayload::Structured(map)
    }
}

impl From<Value> for ToolPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ToolPayload::Structured(map),
            Value::String(text) => ToolPayload::Text(text),
            other => ToolPayload::Text(other.to_string()),
        }
    }
}

impl From<String> for ToolPayload {
    fn from(text: String) -> Self {
        ToolPayload::Text(text)
    }
}

impl From<&str> for ToolPayload {
    fn from(text: &str) -> Self {
        ToolPayload::Text(text.to_string())
    }
}

/// Canonical form of a call: a non-empty tool name and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

impl CallRequest {
    pub fn new(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }

    /// Strict variant of [`normalize_payload`].
    ///
    /// Text that is not JSON, JSON that is not an object and objects without a
    /// recognised key are `InvalidPayload`; a recognised shape whose name is not
    /// a non-empty string is `MissingToolName`.
    pub fn try_from_payload(payload: &ToolPayload) -> Result<Self> {
        let parsed;
        let map = match payload {
            ToolPayload::Structured(map) => map,
            ToolPayload::Text(text) => {
                parsed = serde_json::from_str::<Value>(text).map_err(|_| {
                    McpClientError::InvalidPayload("payload is not JSON".to_string())
                })?;
                match &parsed {
                    Value::Object(map) => map,
                    _ => {
                        return Err(McpClientError::InvalidPayload(
                            "payload is not a JSON object".to_string(),
                        ))
                    }
                }
            }
        };

        let (key, name) = if let Some(name) = map.get("tool") {
            ("tool", name)
        } else if let Some(name) = map.get("tool_name") {
            ("tool_name", name)
        } else if let Some(name) = map.get("name") {
            ("name", name)
        } else {
            return Err(McpClientError::InvalidPayload(
                "expected one of 'tool', 'tool_name' or 'name'".to_string(),
            ));
        };

        let tool_name = match name.as_str() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(McpClientError::MissingToolName),
        };

        let nested = if key == "tool" {
            map.get("parameters").and_then(Value::as_object).cloned()
        } else {
            None
        };
        let parameters = nested.unwrap_or_else(|| {
            map.iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });

        Ok(Self {
            tool_name,
            parameters,
        })
    }
}

/// Extract the call from a payload, or `None` when it is not a tool call
/// (natural language, or an unrecognised shape).
///
/// Recognised shapes, first match wins:
/// 1. `{"tool": name, "parameters": {...}}`, falling back to the sibling keys
///    when `parameters` is missing or not an object
/// 2. `{"tool_name": name, ...}`
/// 3. `{"name": name, ...}`
pub fn normalize_payload(payload: &ToolPayload) -> Option<CallRequest> {
    CallRequest::try_from_payload(payload).ok()
}
