//! Main proxy server: builds the HTTP front-end (component E) over the
//! upstream registry and runs it with graceful shutdown.

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::error::{ConfigError, ConfigErrorKind, Error, Result};
use crate::proxy::handler;
use crate::proxy::registry::Registry;

/// Shared application state passed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

pub struct ProxyServer {
    registry: Arc<Registry>,
    host: String,
    port: u16,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ProxyServer {
    pub fn new(config: &ResolvedConfig, registry: Arc<Registry>) -> Self {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
        Self {
            registry,
            host: config.proxy.host.clone(),
            port: config.proxy.port,
            shutdown_tx,
        }
    }

    fn build_router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
        };

        Router::new()
            .route("/", get(handler::index))
            .route("/status", get(handler::status))
            .route("/:name", get(handler::list_tools).post(handler::call_tool))
            .route("/:name/health", get(handler::probe_health))
            .fallback(handler::not_found)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until the returned sender receives a shutdown signal
    /// (see `shutdown`) or the caller's own `shutdown_rx` fires.
    pub async fn run(self, mut shutdown_rx: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
        let router = self.build_router();
        let addr: SocketAddr = format!("{}:{}", self.host, self.port).parse().map_err(|e| {
            Error::Config(
                ConfigError::new(ConfigErrorKind::SchemaViolation, format!("invalid proxy address: {e}"))
                    .at("proxy"),
            )
        })?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(Error::Io)?;
        info!(%addr, "proxy front-end listening");

        let internal_shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let mut internal_shutdown_rx = internal_shutdown_rx;
                tokio::select! {
                    _ = internal_shutdown_rx.recv() => {},
                    _ = shutdown_rx.recv() => {},
                }
                info!("proxy front-end shutting down");
            })
            .await
            .map_err(Error::Io)?;

        Ok(())
    }

    /// Trigger shutdown from outside the `run` future, e.g. in tests.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
