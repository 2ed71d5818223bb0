//! Upstream registry (component D). Owns `name -> Upstream` and is the
//! single path by which the HTTP front-end reaches a driver. No
//! tool-to-server map, no consistent-hash ring, no runtime
//! `add_server`/`remove_server`: the configuration is frozen at startup,
//! so a plain immutable map built once suffices.

use crate::config::{ResolvedConfig, UpstreamSpec};
use crate::error::{ClientError, Error, Result, UpstreamError};
use crate::supervisor::{ProcessState, Supervisor};
use crate::transport::command::CommandDriver;
use crate::transport::http::{shared_client, HttpDriver};
use crate::transport::sse::SseDriver;
use crate::transport::Driver;
use crate::types::{ServerId, ToolDescriptor, ToolResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// One enabled, routable upstream.
pub struct Upstream {
    pub name: ServerId,
    pub spec: UpstreamSpec,
    pub driver: Arc<dyn Driver>,
    pub start_time: Instant,
}

/// Summary returned by `GET /status` and `list()`.
pub struct UpstreamSummary {
    pub name: String,
    pub transport: &'static str,
    pub running: bool,
    pub pid: Option<u32>,
    pub uptime_secs: u64,
    pub url: Option<String>,
}

pub struct Registry {
    upstreams: Vec<Upstream>,
    supervisor: Arc<Supervisor>,
}

impl Registry {
    /// Build the registry once at startup. Disabled upstreams are not
    /// registered at all — they behave identically to an unknown name.
    pub fn build(config: &ResolvedConfig, supervisor: Arc<Supervisor>) -> Result<Self> {
        let client = shared_client();
        let mut upstreams = Vec::new();

        for (name, spec) in &config.upstreams {
            if spec.is_disabled() {
                continue;
            }
            let driver: Arc<dyn Driver> = match spec {
                UpstreamSpec::Command { .. } => {
                    Arc::new(CommandDriver::new(name.clone(), supervisor.clone()))
                },
                UpstreamSpec::Http { .. } => {
                    Arc::new(HttpDriver::new(name.clone(), client.clone(), spec)?)
                },
                UpstreamSpec::Sse { .. } => {
                    Arc::new(SseDriver::new(name.clone(), client.clone(), spec)?)
                },
            };

            upstreams.push(Upstream {
                name: name.clone(),
                spec: spec.clone(),
                driver,
                start_time: Instant::now(),
            });
        }

        Ok(Self {
            upstreams,
            supervisor,
        })
    }

    fn find(&self, name: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| u.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.upstreams.iter().map(|u| u.name.clone()).collect()
    }

    /// `command` upstreams fail fast with `unavailable` when the
    /// supervisor reports anything other than `Running`; `http`/`sse`
    /// upstreams have no supervisor-tracked state and are always
    /// attempted.
    fn check_command_state(&self, upstream: &Upstream) -> Result<()> {
        if let UpstreamSpec::Command { .. } = upstream.spec {
            match self.supervisor.state(&upstream.name) {
                Some(ProcessState::Running) => Ok(()),
                _ => Err(Error::Upstream(UpstreamError::unavailable(format!(
                    "upstream '{}' is not running",
                    upstream.name
                )))),
            }
        } else {
            Ok(())
        }
    }

    pub async fn list_tools(&self, name: &str) -> Result<Vec<ToolDescriptor>> {
        let upstream = self
            .find(name)
            .ok_or_else(|| Error::Client(ClientError::NotFound(name.to_string())))?;
        self.check_command_state(upstream)?;
        upstream.driver.list_tools().await
    }

    pub async fn call_tool(&self, name: &str, tool: &str, arguments: Value) -> Result<ToolResult> {
        let upstream = self
            .find(name)
            .ok_or_else(|| Error::Client(ClientError::NotFound(name.to_string())))?;
        self.check_command_state(upstream)?;
        upstream.driver.call_tool(tool, arguments).await
    }

    pub fn list(&self) -> Vec<UpstreamSummary> {
        let snapshot = self.supervisor.snapshot();
        self.upstreams
            .iter()
            .map(|u| {
                let tracked = snapshot.iter().find(|c| c.name == u.name);
                let state = tracked.map(|c| c.state);
                UpstreamSummary {
                    name: u.name.clone(),
                    transport: u.spec.transport_tag(),
                    running: matches!(state, Some(ProcessState::Running)) || state.is_none(),
                    pid: tracked.and_then(|c| c.pid),
                    uptime_secs: u.start_time.elapsed().as_secs(),
                    url: u.spec.url().map(str::to_string),
                }
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthConfig, ProxyConfig, ResourcesConfig};
    use indexmap::IndexMap;
    use std::collections::HashMap;

    #[test]
    fn disabled_upstream_is_not_registered() {
        let mut upstreams = IndexMap::new();
        upstreams.insert(
            "disabled".to_string(),
            UpstreamSpec::Command {
                command: "cat".to_string(),
                args: vec![],
                env: HashMap::new(),
                disabled: true,
                auto_approve: vec![],
            },
        );
        let config = ResolvedConfig {
            upstreams,
            proxy: ProxyConfig::default(),
            health: HealthConfig::default(),
            resources: ResourcesConfig::default(),
        };
        let registry = Registry::build(&config, Arc::new(Supervisor::new())).unwrap();
        assert!(!registry.contains("disabled"));
    }
}
