//! End-to-end coverage of the HTTP front-end (component E) over a real
//! `streamable_http` upstream, mocked with `wiremock` the way a remote MCP
//! server would actually reply: one JSON-RPC envelope per POST.

use indexmap::IndexMap;
use only1mcp::config::{HealthConfig, ProxyConfig, ResolvedConfig, ResourcesConfig, UpstreamSpec};
use only1mcp::proxy::registry::Registry;
use only1mcp::proxy::ProxyServer;
use only1mcp::supervisor::Supervisor;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Binds an ephemeral port, releases it immediately, and returns the
/// number so a `ResolvedConfig` can be built before the real server binds
/// it again. A small accepted race in exchange for not plumbing the bound
/// address back out of `ProxyServer::run`.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_proxy(upstream_url: String) -> (String, tokio::task::JoinHandle<()>) {
    let mut upstreams = IndexMap::new();
    upstreams.insert(
        "echo".to_string(),
        UpstreamSpec::Http {
            url: upstream_url,
            headers: HashMap::new(),
            disabled: false,
        },
    );

    let port = free_port();
    let config = ResolvedConfig {
        upstreams,
        proxy: ProxyConfig {
            host: "127.0.0.1".to_string(),
            port,
            log_level: "INFO".to_string(),
        },
        health: HealthConfig::default(),
        resources: ResourcesConfig::default(),
    };

    let supervisor = Arc::new(Supervisor::new());
    let registry = Arc::new(Registry::build(&config, supervisor).unwrap());
    let server = ProxyServer::new(&config, registry);
    let (_tx, rx) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(async move {
        let _ = server.run(rx).await;
    });

    // Give the listener a moment to bind before the first request fires.
    tokio::time::sleep(Duration::from_millis(100)).await;
    (format!("http://127.0.0.1:{port}"), handle)
}

#[tokio::test]
async fn index_lists_configured_upstreams() {
    let upstream = MockServer::start().await;
    let (base, handle) = start_proxy(upstream.uri()).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/")).await.unwrap().json().await.unwrap();
    assert_eq!(body["servers"], json!(["echo"]));

    handle.abort();
}

#[tokio::test]
async fn post_round_trip_returns_server_tool_and_result() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "whatever",
            "result": { "ok": true }
        })))
        .mount(&upstream)
        .await;

    let (base, handle) = start_proxy(upstream.uri()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/echo"))
        .json(&json!({ "tool": "ping", "arguments": {} }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["server"], "echo");
    assert_eq!(body["tool"], "ping");
    assert_eq!(body["result"], json!({ "ok": true }));

    handle.abort();
}

#[tokio::test]
async fn post_missing_tool_is_a_400_with_exact_message() {
    let upstream = MockServer::start().await;
    let (base, handle) = start_proxy(upstream.uri()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/echo"))
        .json(&json!({ "arguments": {} }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Missing 'tool' parameter");

    handle.abort();
}

#[tokio::test]
async fn post_malformed_json_is_a_400_with_exact_message() {
    let upstream = MockServer::start().await;
    let (base, handle) = start_proxy(upstream.uri()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/echo"))
        .header("content-type", "application/json")
        .body("{not valid json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Invalid JSON in request body");

    handle.abort();
}

#[tokio::test]
async fn unknown_server_is_a_404_with_exact_body() {
    let upstream = MockServer::start().await;
    let (base, handle) = start_proxy(upstream.uri()).await;

    let resp = reqwest::get(format!("{base}/unknown")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "error": { "code": 404, "message": "Server not found: unknown" } })
    );

    handle.abort();
}

#[tokio::test]
async fn unmatched_route_falls_back_to_plain_404() {
    let upstream = MockServer::start().await;
    let (base, handle) = start_proxy(upstream.uri()).await;

    let resp = reqwest::get(format!("{base}/echo/tools/extra/segment")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Not found");

    handle.abort();
}
