//! Handlers for the five original routes plus the `GET /{name}/health`
//! reachability probe. Grounded line-for-line on `mcp_proxy.py`'s
//! `MCPProxyHandler`: same JSON shapes, same exact error message text,
//! same status codes.

use crate::error::{ClientError, Error, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::server::AppState;

const SERVER_NAME: &str = "MCP Proxy Server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
struct IndexBody {
    name: &'static str,
    version: &'static str,
    servers: Vec<String>,
    endpoints: Vec<String>,
}

/// `GET /`: static server identity plus the current upstream list.
pub async fn index(State(state): State<AppState>) -> Json<IndexBody> {
    let servers = state.registry.names();
    let endpoints = servers.iter().map(|name| format!("/{name}")).collect();
    Json(IndexBody {
        name: SERVER_NAME,
        version: SERVER_VERSION,
        servers,
        endpoints,
    })
}

#[derive(Serialize)]
struct StatusEntry {
    #[serde(rename = "type")]
    transport: &'static str,
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    uptime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

/// `GET /status`: per-upstream running/pid/uptime snapshot. Only the bare
/// URL is exposed, never the headers configured on an `http`/`sse`
/// upstream — those may carry bearer tokens.
pub async fn status(State(state): State<AppState>) -> Json<HashMap<String, StatusEntry>> {
    let entries = state
        .registry
        .list()
        .into_iter()
        .map(|u| {
            (
                u.name,
                StatusEntry {
                    transport: u.transport,
                    running: u.running,
                    pid: u.pid,
                    uptime: u.uptime_secs,
                    url: u.url,
                },
            )
        })
        .collect();
    Json(entries)
}

#[derive(Serialize)]
struct ToolsBody {
    server: String,
    tools: Vec<crate::types::ToolDescriptor>,
}

/// `GET /{name}`: list the upstream's tools, or `404` if the name is
/// unregistered (disabled upstreams look identical to unknown ones).
pub async fn list_tools(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ToolsBody>> {
    let tools = state.registry.list_tools(&name).await?;
    Ok(Json(ToolsBody { server: name, tools }))
}

#[derive(Deserialize)]
struct ToolCallBody {
    tool: Option<String>,
    #[serde(default)]
    arguments: Value,
}

#[derive(Serialize)]
struct ToolCallResult {
    server: String,
    tool: String,
    result: Value,
}

/// `POST /{name}`: call `body.tool` with `body.arguments`. Malformed JSON
/// and a missing `tool` field are distinguished with the reference
/// implementation's exact wording so clients matching on message text
/// keep working.
pub async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<ToolCallResult>> {
    let parsed: ToolCallBody = serde_json::from_slice(&body).map_err(|_| {
        Error::Client(ClientError::BadRequest(
            "Invalid JSON in request body".to_string(),
        ))
    })?;

    let tool = match parsed.tool.filter(|t| !t.is_empty()) {
        Some(tool) => tool,
        None => {
            return Err(Error::Client(ClientError::BadRequest(
                "Missing 'tool' parameter".to_string(),
            )))
        },
    };

    let result = state
        .registry
        .call_tool(&name, &tool, parsed.arguments)
        .await?;
    Ok(Json(ToolCallResult {
        server: name,
        tool,
        result,
    }))
}

/// `GET /{name}/health`: a reachability probe used by the health
/// aggregator. Issues `listTools(name)` against the registry; any
/// `UpstreamError` is translated to the status code the ordinary
/// `GET /{name}` path would have used for the same failure, so this
/// route invents no new error semantics of its own.
pub async fn probe_health(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.registry.list_tools(&name).await {
        Ok(_) => {
            (StatusCode::OK, Json(serde_json::json!({ "server": name, "healthy": true }))).into_response()
        },
        Err(err) => err.into_response(),
    }
}

#[derive(Serialize)]
struct NotFoundBody {
    error: NotFoundDetail,
}

#[derive(Serialize)]
struct NotFoundDetail {
    code: u16,
    message: &'static str,
}

/// Router fallback: anything not matched by a route above. Built directly
/// rather than through `Error` because this is not an upstream-name
/// mismatch — `ClientError::NotFound`'s "Server not found: ..." wording
/// does not apply to a request with no server segment at all.
pub async fn not_found() -> Response {
    let body = NotFoundBody {
        error: NotFoundDetail {
            code: 404,
            message: "Not found",
        },
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_body_rejects_blank_tool_name() {
        let parsed: ToolCallBody = serde_json::from_str(r#"{"tool":""}"#).unwrap();
        assert!(parsed.tool.filter(|t| !t.is_empty()).is_none());
    }

    #[test]
    fn tool_call_body_defaults_arguments_to_null() {
        let parsed: ToolCallBody = serde_json::from_str(r#"{"tool":"echo"}"#).unwrap();
        assert_eq!(parsed.arguments, Value::Null);
    }

    #[test]
    fn tool_call_body_missing_tool_field_parses_as_none() {
        let parsed: ToolCallBody = serde_json::from_str(r#"{"arguments":{}}"#).unwrap();
        assert!(parsed.tool.is_none());
    }
}
