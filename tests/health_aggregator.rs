//! End-to-end coverage of the health aggregator (component F): it probes
//! a real proxy front-end's `/{name}/health` route and aggregates the
//! result, rather than talking to the upstream driver directly.

use indexmap::IndexMap;
use only1mcp::config::{HealthConfig, ProxyConfig, ResolvedConfig, ResourcesConfig, UpstreamSpec};
use only1mcp::health::{HealthAggregator, HealthServer};
use only1mcp::proxy::registry::Registry;
use only1mcp::proxy::ProxyServer;
use only1mcp::supervisor::Supervisor;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_stack(upstream_url: String) -> (String, String) {
    let mut upstreams = IndexMap::new();
    upstreams.insert(
        "echo".to_string(),
        UpstreamSpec::Http {
            url: upstream_url,
            headers: HashMap::new(),
            disabled: false,
        },
    );

    let proxy_port = free_port();
    let health_port = free_port();
    let config = Arc::new(ResolvedConfig {
        upstreams,
        proxy: ProxyConfig {
            host: "127.0.0.1".to_string(),
            port: proxy_port,
            log_level: "INFO".to_string(),
        },
        health: HealthConfig {
            host: "127.0.0.1".to_string(),
            port: health_port,
            check_interval_seconds: 1,
        },
        resources: ResourcesConfig::default(),
    });

    let supervisor = Arc::new(Supervisor::new());
    let registry = Arc::new(Registry::build(&config, supervisor.clone()).unwrap());
    let proxy = ProxyServer::new(&config, registry);
    let (_tx, proxy_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        let _ = proxy.run(proxy_rx).await;
    });

    let aggregator = Arc::new(HealthAggregator::new(config.clone(), supervisor));
    let health = HealthServer::new(&config, aggregator);
    let (_tx2, health_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        let _ = health.run(health_rx).await;
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    (
        format!("http://127.0.0.1:{proxy_port}"),
        format!("http://127.0.0.1:{health_port}"),
    )
}

#[tokio::test]
async fn health_endpoint_reports_healthy_when_upstream_answers_tools_list() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "x",
            "result": { "tools": [] }
        })))
        .mount(&upstream)
        .await;

    let (_proxy_base, health_base) = start_stack(upstream.uri()).await;

    let resp = reqwest::get(format!("{health_base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["mcp_servers"]["echo"]["healthy"], true);
}

#[tokio::test]
async fn health_endpoint_reports_unhealthy_when_upstream_errors() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let (_proxy_base, health_base) = start_stack(upstream.uri()).await;

    let resp = reqwest::get(format!("{health_base}/health")).await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["mcp_servers"]["echo"]["healthy"], false);
}

#[tokio::test]
async fn liveness_is_always_ok_and_metrics_exposes_known_series() {
    let upstream = MockServer::start().await;
    let (_proxy_base, health_base) = start_stack(upstream.uri()).await;

    let liveness = reqwest::get(format!("{health_base}/liveness")).await.unwrap();
    assert_eq!(liveness.status(), 200);

    // Trigger one refresh so the per-server gauge has a labeled sample.
    let _ = reqwest::get(format!("{health_base}/health")).await.unwrap();

    let metrics = reqwest::get(format!("{health_base}/metrics")).await.unwrap();
    assert_eq!(metrics.status(), 200);
    let text = metrics.text().await.unwrap();
    assert!(text.contains("mcpo_cpu_percent"));
    assert!(text.contains("mcpo_server_status"));
}
