// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Line-delimited JSON-RPC envelope spoken to tool servers.
//!
//! The protocol is deliberately small: `initialize` handshake, `tools/list`
//! enumeration, `tools/call` dispatch.  Both transports reuse these types;
//! only the framing differs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// One tool advertised by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

/// Extract the tool list from a `tools/list` result.
pub fn parse_tool_list(result: &Value) -> Vec<RemoteToolInfo> {
    result
        .get("tools")
        .and_then(|t| t.as_array())
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a `tools/call` result into plain text: the concatenation of all
/// `text` content items, or the raw JSON when the shape is unexpected.
pub fn call_result_text(result: &Value) -> String {
    match result.get("content").and_then(|c| c.as_array()) {
        Some(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        None => result.to_string(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_version() {
        let req = RpcRequest::new(7, "tools/list", None);
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains("\"jsonrpc\":\"2.0\""));
        assert!(text.contains("\"id\":7"));
        assert!(!text.contains("params"));
    }

    #[test]
    fn tool_list_parses_and_defaults_schema() {
        let result = json!({
            "tools": [
                { "name": "create", "description": "make a note" },
                { "name": "delete", "input_schema": { "type": "object" } },
            ]
        });
        let tools = parse_tool_list(&result);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "create");
        assert_eq!(tools[1].input_schema["type"], "object");
    }

    #[test]
    fn call_result_joins_text_items() {
        let result = json!({
            "content": [
                { "type": "text", "text": "line one" },
                { "type": "text", "text": "line two" },
            ]
        });
        assert_eq!(call_result_text(&result), "line one\nline two");
    }

    #[test]
    fn call_result_falls_back_to_raw_json() {
        let result = json!({ "value": 42 });
        assert_eq!(call_result_text(&result), "{\"value\":42}");
    }
}
