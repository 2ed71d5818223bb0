//! `sse` driver: the configured `sse` upstream is driven with the same
//! POST-a-JSON-RPC-envelope shape as `streamable_http` (matching the
//! reference implementation's observed behavior, not the labeled
//! event-stream protocol). Kept as its own thin type rather than a type
//! alias so the two transports can diverge later without a breaking
//! rename.

use crate::config::UpstreamSpec;
use crate::error::{Error, Result, UpstreamError};
use crate::types::{next_request_id, McpRequest, McpResponse, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;

use super::Driver;

pub struct SseDriver {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    client: Client,
}

impl SseDriver {
    pub fn new(name: String, client: Client, spec: &UpstreamSpec) -> Result<Self> {
        let UpstreamSpec::Sse { url, headers, .. } = spec else {
            return Err(Error::Internal(format!(
                "SseDriver constructed for non-sse upstream '{name}'"
            )));
        };
        Ok(Self {
            name,
            url: url.clone(),
            headers: headers.clone(),
            client,
        })
    }

    async fn roundtrip(&self, request: McpRequest) -> Result<McpResponse> {
        let mut builder = self.client.post(&self.url).json(&request);
        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case("content-type") {
                continue;
            }
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(|e| {
            Error::Upstream(UpstreamError::unavailable(format!(
                "request to upstream '{}' failed: {e}",
                self.name
            )))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(UpstreamError::protocol(format!(
                "upstream '{}' replied with {status}: {body}",
                self.name
            ))));
        }

        response.json::<McpResponse>().await.map_err(|e| {
            Error::Upstream(UpstreamError::protocol(format!(
                "malformed reply from '{}': {e}",
                self.name
            )))
        })
    }
}

#[async_trait]
impl Driver for SseDriver {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_sse_spec() {
        let spec = UpstreamSpec::Command {
            command: "echo".to_string(),
            args: vec![],
            env: HashMap::new(),
            disabled: false,
            auto_approve: vec![],
        };
        let err = SseDriver::new("x".to_string(), crate::transport::http::shared_client(), &spec);
        assert!(err.is_err());
    }
}
