//! `streamable_http` driver: one JSON-RPC POST per call against the
//! upstream's configured `url`, using a single shared `reqwest::Client`.
//! No connection pool beyond what the client already does internally, no
//! health-check-on-connect, no exponential backoff; a remote MCP server
//! is expected to be reachable or to fail the call outright.

use crate::config::UpstreamSpec;
use crate::error::{Error, Result, UpstreamError};
use crate::types::{next_request_id, McpRequest, McpResponse, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use super::Driver;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared across every `streamable_http` and `sse` upstream; reqwest's
/// client already pools connections internally, so there is no per-driver
/// pool to manage on top of it.
pub fn shared_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("static reqwest client configuration is valid")
}

pub struct HttpDriver {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    client: Client,
}

impl HttpDriver {
    pub fn new(name: String, client: Client, spec: &UpstreamSpec) -> Result<Self> {
        let UpstreamSpec::Http { url, headers, .. } = spec else {
            return Err(Error::Internal(format!(
                "HttpDriver constructed for non-http upstream '{name}'"
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
impl Driver for HttpDriver {
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
    fn rejects_non_http_spec() {
        let spec = UpstreamSpec::Command {
            command: "echo".to_string(),
            args: vec![],
            env: HashMap::new(),
            disabled: false,
            auto_approve: vec![],
        };
        let err = HttpDriver::new("x".to_string(), shared_client(), &spec);
        assert!(err.is_err());
    }
}
