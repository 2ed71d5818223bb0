//! The health aggregator's own HTTP surface: `/health`, `/readiness`,
//! `/liveness`, `/metrics`, `/status`. A second, independent Axum server
//! from the proxy front-end, bound to `healthCheck.host`/`healthCheck.port`.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::error::{ConfigError, ConfigErrorKind, Error, Result};
use crate::health::checker::HealthAggregator;

#[derive(Clone)]
struct AppState {
    aggregator: Arc<HealthAggregator>,
}

pub struct HealthServer {
    aggregator: Arc<HealthAggregator>,
    host: String,
    port: u16,
}

impl HealthServer {
    pub fn new(config: &ResolvedConfig, aggregator: Arc<HealthAggregator>) -> Self {
        Self {
            aggregator,
            host: config.health.host.clone(),
            port: config.health.port,
        }
    }

    fn build_router(&self) -> Router {
        let state = AppState {
            aggregator: self.aggregator.clone(),
        };
        Router::new()
            .route("/health", get(health))
            .route("/readiness", get(readiness))
            .route("/liveness", get(liveness))
            .route("/metrics", get(metrics))
            .route("/status", get(status))
            .with_state(state)
    }

    pub async fn run(self, mut shutdown_rx: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
        let router = self.build_router();
        let addr: SocketAddr = format!("{}:{}", self.host, self.port).parse().map_err(|e| {
            Error::Config(
                ConfigError::new(ConfigErrorKind::SchemaViolation, format!("invalid health address: {e}"))
                    .at("healthCheck"),
            )
        })?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(Error::Io)?;
        info!(%addr, "health aggregator listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("health aggregator shutting down");
            })
            .await
            .map_err(Error::Io)?;

        Ok(())
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (healthy, body) = state.aggregator.health_body().await;
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.aggregator.config_loaded() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "not ready" })))
    }
}

async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let text = state.aggregator.metrics_text();
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text)
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.aggregator.detailed_status_body().await)
}
