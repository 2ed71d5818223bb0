//! Upstream drivers (component B). Three implementations of one contract,
//! modeled as a trait object rather than an inheritance hierarchy.

pub mod command;
pub mod http;
pub mod sse;

use crate::error::Result;
use crate::types::{ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde_json::Value;

/// Shared contract for `command`, `http` (tag `streamable_http`), and
/// `sse` upstreams. Every call goes over the wire as a JSON-RPC 2.0
/// envelope with method `tools/list` or `tools/call`.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolResult>;
}
