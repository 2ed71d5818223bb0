//! Probe loop and cached status (component F). Grounded on
//! `health_check.py`'s `HealthCheckServer`: a background task (see
//! `spawn_probe_loop`) probes every configured upstream through the proxy's
//! own `GET /{name}/health` on a fixed `checkInterval` tick, classified
//! healthy/unhealthy/disabled and cached; a request that arrives after the
//! cache has gone stale additionally triggers a synchronous refresh before
//! it is answered.

use crate::config::ResolvedConfig;
use crate::metrics::MetricsRegistry;
use crate::supervisor::Supervisor;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct ServerProbe {
    pub status: &'static str,
    pub healthy: bool,
    pub message: String,
}

struct CachedState {
    server_status: HashMap<String, ServerProbe>,
    last_check: Instant,
}

pub struct HealthAggregator {
    config: Arc<ResolvedConfig>,
    supervisor: Arc<Supervisor>,
    client: reqwest::Client,
    metrics: MetricsRegistry,
    start_time: Instant,
    state: RwLock<CachedState>,
}

impl HealthAggregator {
    pub fn new(config: Arc<ResolvedConfig>, supervisor: Arc<Supervisor>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("static reqwest client configuration is valid");

        Self {
            config,
            supervisor,
            client,
            metrics: MetricsRegistry::new(),
            start_time: Instant::now(),
            state: RwLock::new(CachedState {
                server_status: HashMap::new(),
                last_check: Instant::now() - Duration::from_secs(3600),
            }),
        }
    }

    fn check_interval(&self) -> Duration {
        Duration::from_secs(self.config.health.check_interval_seconds)
    }

    /// Starts the background probe task required by §4.F: probes every
    /// configured upstream every `checkInterval`, independent of whether
    /// anything is reading `/health`/`/status`/`/metrics`. Grounded in
    /// `health_check.py`'s `HealthCheckServer`, which polls unconditionally
    /// on its own background thread rather than only lazily on request.
    pub fn spawn_probe_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.check_interval());
            loop {
                ticker.tick().await;
                this.refresh().await;
            }
        });
    }

    /// Re-probe every configured upstream only if the cache is older than
    /// `checkInterval`; otherwise this is a no-op (synchronous
    /// refresh-before-respond only when the cache has actually gone stale).
    pub async fn ensure_fresh(&self) {
        let stale = {
            let state = self.state.read().await;
            state.last_check.elapsed() > self.check_interval()
        };
        if stale {
            self.refresh().await;
        }
    }

    pub async fn refresh(&self) {
        let mut server_status = HashMap::new();
        for (name, spec) in &self.config.upstreams {
            let probe = if spec.is_disabled() {
                ServerProbe {
                    status: "disabled",
                    healthy: true,
                    message: "Server is disabled".to_string(),
                }
            } else {
                self.probe_one(name).await
            };
            self.metrics.record_server_status(name, probe.healthy);
            server_status.insert(name.clone(), probe);
        }

        {
            let mut state = self.state.write().await;
            state.server_status = server_status;
            state.last_check = Instant::now();
        }

        self.metrics.record_processes(&self.supervisor.snapshot());
    }

    /// `GET http://{proxy.host}:{proxy.port}/{name}/health` — the proxy's
    /// own reachability probe route for this upstream.
    async fn probe_one(&self, name: &str) -> ServerProbe {
        let url = format!(
            "http://{}:{}/{}/health",
            self.config.proxy.host, self.config.proxy.port, name
        );
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => ServerProbe {
                status: "healthy",
                healthy: true,
                message: "Server is responding".to_string(),
            },
            Ok(resp) => ServerProbe {
                status: "unhealthy",
                healthy: false,
                message: format!("Server returned status code {}", resp.status().as_u16()),
            },
            Err(e) => {
                warn!(upstream = %name, error = %e, "health probe failed");
                ServerProbe {
                    status: "unhealthy",
                    healthy: false,
                    message: format!("Failed to connect to server: {e}"),
                }
            },
        }
    }

    /// Conjunction over every enabled upstream's cached healthy flag and
    /// absence of any supervisor `GivenUp` child.
    pub async fn is_healthy(&self) -> bool {
        let all_healthy = self
            .state
            .read()
            .await
            .server_status
            .values()
            .all(|p| p.healthy);
        all_healthy && !self.supervisor.any_given_up()
    }

    fn resources(&self) -> crate::resources::ResourceSnapshot {
        let snapshot = crate::resources::sample(&self.config.resources);
        self.metrics
            .record_resources(&snapshot, self.start_time.elapsed().as_secs_f64());
        snapshot
    }

    /// Body for `GET /health`: `(is_healthy, json)`.
    pub async fn health_body(&self) -> (bool, Value) {
        self.ensure_fresh().await;
        let healthy = self.is_healthy().await;
        let server_status = self.state.read().await.server_status.clone();
        let resources = self.resources();
        let body = serde_json::json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "timestamp": self.start_time.elapsed().as_secs(),
            "mcp_servers": server_status,
            "resources": resources,
        });
        (healthy, body)
    }

    /// Body for `GET /status`: adds uptime and per-process detail to the
    /// health body.
    pub async fn detailed_status_body(&self) -> Value {
        self.ensure_fresh().await;
        let healthy = self.is_healthy().await;
        let server_status = self.state.read().await.server_status.clone();
        let resources = self.resources();
        let processes: HashMap<String, Value> = self
            .supervisor
            .snapshot()
            .into_iter()
            .map(|c| {
                (
                    c.name.clone(),
                    serde_json::json!({
                        "running": matches!(c.state, crate::supervisor::ProcessState::Running),
                        "pid": c.pid,
                        "restart_count": c.restart_count,
                        "uptime": c.start_time.elapsed().as_secs(),
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "uptime": self.start_time.elapsed().as_secs(),
            "mcp_servers": server_status,
            "processes": processes,
            "resources": resources,
            "process_monitor_enabled": true,
        })
    }

    pub fn metrics_text(&self) -> Vec<u8> {
        self.resources();
        self.metrics.render()
    }

    pub fn config_loaded(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthConfig, ProxyConfig, ResourcesConfig, UpstreamSpec};
    use indexmap::IndexMap;
    use std::collections::HashMap as StdHashMap;

    fn test_config() -> Arc<ResolvedConfig> {
        let mut upstreams = IndexMap::new();
        upstreams.insert(
            "disabled".to_string(),
            UpstreamSpec::Command {
                command: "cat".to_string(),
                args: vec![],
                env: StdHashMap::new(),
                disabled: true,
                auto_approve: vec![],
            },
        );
        Arc::new(ResolvedConfig {
            upstreams,
            proxy: ProxyConfig::default(),
            health: HealthConfig::default(),
            resources: ResourcesConfig::default(),
        })
    }

    #[tokio::test]
    async fn disabled_upstream_is_trivially_healthy() {
        let aggregator = HealthAggregator::new(test_config(), Arc::new(Supervisor::new()));
        aggregator.refresh().await;
        let (healthy, _) = aggregator.health_body().await;
        assert!(healthy);
    }

    #[tokio::test]
    async fn no_given_up_children_does_not_block_health() {
        let supervisor = Arc::new(Supervisor::new());
        let aggregator = HealthAggregator::new(test_config(), supervisor);
        aggregator.refresh().await;
        assert!(aggregator.is_healthy().await);
    }
}
