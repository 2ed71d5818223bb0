//! `command` driver: one newline-delimited JSON-RPC round trip per call
//! over the child's stdin/stdout, serialized by the supervisor's per-child
//! mutex. No MCP `initialize` handshake, no NPX resolution, no process
//! sandboxing — none of those have a counterpart in this driver's
//! contract.

use crate::error::{Error, Result, UpstreamError};
use crate::supervisor::Supervisor;
use crate::types::{next_request_id, McpRequest, McpResponse, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use super::Driver;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CommandDriver {
    name: String,
    supervisor: Arc<Supervisor>,
}

impl CommandDriver {
    pub fn new(name: String, supervisor: Arc<Supervisor>) -> Self {
        Self { name, supervisor }
    }

    async fn roundtrip(&self, request: McpRequest) -> Result<McpResponse> {
        let pipes = self.supervisor.pipes(&self.name).ok_or_else(|| {
            Error::Upstream(UpstreamError::unavailable(format!(
                "upstream '{}' has no running child",
                self.name
            )))
        })?;

        let call = async {
            let mut line = serde_json::to_string(&request)?;
            line.push('\n');

            let mut guard = pipes.io.lock().await;
            let (stdin, stdout) = &mut *guard;

            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;

            let mut reply = String::new();
            let n = stdout.read_line(&mut reply).await?;
            if n == 0 {
                return Err(Error::Upstream(UpstreamError::unavailable(format!(
                    "upstream '{}' closed its stdout",
                    self.name
                ))));
            }

            let response: McpResponse = serde_json::from_str(reply.trim_end()).map_err(|e| {
                Error::Upstream(UpstreamError::protocol(format!(
                    "malformed reply from '{}': {e}",
                    self.name
                )))
            })?;
            Ok(response)
        };

        match tokio::time::timeout(CALL_TIMEOUT, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Upstream(UpstreamError::timeout(format!(
                "upstream '{}' did not reply within {:?}",
                self.name, CALL_TIMEOUT
            )))),
        }
    }
}

#[async_trait]
impl Driver for CommandDriver {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let id = next_request_id(&self.name, "tools/list");
        let request = McpRequest::new(id, "tools/list", None);
        let response = self.roundtrip(request).await?;

        if let Some(err) = response.error {
            return Err(Error::Upstream(UpstreamError::remote(
                err.code,
                err.message,
                err.data,
            )));
        }

        let tools = response
            .result
            .and_then(|v| v.get("tools").cloned())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Ok(tools)
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolResult> {
        let id = next_request_id(&self.name, "tools/call");
        let params = serde_json::json!({ "name": tool, "arguments": arguments });
        let request = McpRequest::new(id, "tools/call", Some(params));
        let response = self.roundtrip(request).await?;

        if let Some(err) = response.error {
            return Err(Error::Upstream(UpstreamError::remote(
                err.code,
                err.message,
                err.data,
            )));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }
}
