//! JSON-RPC envelope and tool-level types shared across drivers, the
//! registry, and the HTTP front-end.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// MCP JSON-RPC request. `id` is always a fresh, caller-assigned string
/// (see `next_request_id`), never reused across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(id: String, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// MCP JSON-RPC response: exactly one of `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Upstream name, validated against `[A-Za-z0-9_-]+` at config load.
pub type ServerId = String;

/// Tool name as reported by an upstream's `tools/list`.
pub type ToolName = String;

/// One entry of a `tools/list` result. Upstreams are free to attach
/// arbitrary additional fields (input schema, description) which are
/// preserved in `extra` and re-serialized untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub extra: Value,
}

/// The `result` payload of a successful `tools/call`.
pub type ToolResult = Value;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds a fresh id of the recommended form
/// `"{upstream}_{method}_{monotonic-micros}"`. The counter, not wall-clock
/// time, guarantees uniqueness even under rapid concurrent calls.
pub fn next_request_id(upstream: &str, method: &str) -> String {
    let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{upstream}_{method}_{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = next_request_id("echo", "tools/call");
        let b = next_request_id("echo", "tools/call");
        assert_ne!(a, b);
        assert!(a.starts_with("echo_tools/call_"));
    }
}
