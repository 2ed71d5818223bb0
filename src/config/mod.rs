//! Configuration resolution: `ConfigSource -> ResolvedConfig`.
//!
//! Loaded once at process startup and frozen. There is no hot-reload here
//! (dynamic reconfiguration is out of scope); a new configuration takes
//! effect only by restarting the process.

pub mod validation;

use crate::error::{ConfigError, ConfigErrorKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Embedded minimal schema used for validation and default injection. There
/// is no external schema file and no optional `jsonschema`-equivalent
/// dependency to fall back from; this is the only validator this crate
/// ships (see `validation::basic_validate`).
pub const SCHEMA: &str = include_str!("schema.json");

/// Frozen configuration produced by `resolve`. No interior mutability, no
/// setters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    #[serde(rename = "mcpServers")]
    pub upstreams: IndexMap<String, UpstreamSpec>,
    pub proxy: ProxyConfig,
    #[serde(rename = "healthCheck")]
    pub health: HealthConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_host")]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(rename = "logLevel", default = "default_log_level")]
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_proxy_host(),
            port: default_proxy_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_proxy_host() -> String {
    "0.0.0.0".to_string()
}
fn default_proxy_port() -> u16 {
    8000
}
fn default_log_level() -> String {
    "INFO".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_host")]
    pub host: String,
    #[serde(default = "default_health_port")]
    pub port: u16,
    #[serde(
        rename = "checkIntervalSeconds",
        default = "default_check_interval_seconds"
    )]
    pub check_interval_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            host: default_health_host(),
            port: default_health_port(),
            check_interval_seconds: default_check_interval_seconds(),
        }
    }
}

fn default_health_host() -> String {
    "0.0.0.0".to_string()
}
fn default_health_port() -> u16 {
    8080
}
fn default_check_interval_seconds() -> u64 {
    30
}

/// Optional `resources` section: where to find the host sampling
/// utilities the health aggregator shells out to. Has no bearing on
/// `mcpServers`/`proxy`/`healthCheck`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(rename = "psPath", default = "default_ps_path")]
    pub ps_path: String,
    #[serde(rename = "dfPath", default = "default_df_path")]
    pub df_path: String,
    #[serde(rename = "mountPoint", default = "default_mount_point")]
    pub mount_point: String,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            ps_path: default_ps_path(),
            df_path: default_df_path(),
            mount_point: default_mount_point(),
        }
    }
}

fn default_ps_path() -> String {
    "ps".to_string()
}
fn default_df_path() -> String {
    "df".to_string()
}
fn default_mount_point() -> String {
    "/".to_string()
}

/// One configured upstream. Tagged on `type`; `streamable_http` is the
/// canonical JSON tag for the http driver (`http` is accepted as an
/// alias).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamSpec {
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        disabled: bool,
        #[serde(rename = "autoApprove", default)]
        auto_approve: Vec<String>,
    },
    #[serde(rename = "streamable_http", alias = "http")]
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        disabled: bool,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        disabled: bool,
    },
}

impl UpstreamSpec {
    pub fn is_disabled(&self) -> bool {
        match self {
            UpstreamSpec::Command { disabled, .. } => *disabled,
            UpstreamSpec::Http { disabled, .. } => *disabled,
            UpstreamSpec::Sse { disabled, .. } => *disabled,
        }
    }

    pub fn transport_tag(&self) -> &'static str {
        match self {
            UpstreamSpec::Command { .. } => "command",
            UpstreamSpec::Http { .. } => "streamable_http",
            UpstreamSpec::Sse { .. } => "sse",
        }
    }

    /// Configured URL, if any — used by `GET /status`'s per-upstream
    /// snapshot.
    pub fn url(&self) -> Option<&str> {
        match self {
            UpstreamSpec::Command { .. } => None,
            UpstreamSpec::Http { url, .. } | UpstreamSpec::Sse { url, .. } => Some(url),
        }
    }
}

const UPSTREAM_NAME_RE_MSG: &str =
    "upstream names must match [A-Za-z0-9_-]+ and be non-empty";

fn is_valid_upstream_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Step 1-5 of the config resolver contract: read-or-example-fallback,
/// validate, apply defaults, substitute `${NAME}`, freeze.
pub fn resolve(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let (raw_text, used_path) = read_with_example_fallback(path)?;

    let mut document: serde_json::Value = serde_json::from_str(&raw_text).map_err(|e| {
        ConfigError::new(ConfigErrorKind::InvalidJson, e.to_string()).at(used_path.clone())
    })?;

    let schema: serde_json::Value = serde_json::from_str(SCHEMA)
        .expect("embedded config schema is valid JSON");

    validation::basic_validate(&document, &schema, "")?;
    validation::apply_schema_defaults(&mut document, &schema);
    validation::substitute_env_vars(&mut document)?;

    for key in document
        .as_object()
        .map(|o| o.get("mcpServers"))
        .flatten()
        .and_then(|v| v.as_object())
        .map(|o| o.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default()
    {
        if !is_valid_upstream_name(&key) {
            return Err(
                ConfigError::new(ConfigErrorKind::SchemaViolation, UPSTREAM_NAME_RE_MSG)
                    .at(format!("mcpServers.{key}")),
            );
        }
    }

    serde_json::from_value(document).map_err(|e| {
        ConfigError::new(ConfigErrorKind::SchemaViolation, e.to_string()).at(used_path)
    })
}

fn read_with_example_fallback(path: &Path) -> Result<(String, String), ConfigError> {
    if path.exists() {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new(ConfigErrorKind::NotFound, e.to_string())
                .at(path.display().to_string())
        })?;
        return Ok((text, path.display().to_string()));
    }

    let example = path.with_extension("").with_extension("example.json");
    if example.exists() {
        tracing::info!(
            path = %path.display(),
            example = %example.display(),
            "configuration file not found, using example configuration"
        );
        let text = std::fs::read_to_string(&example).map_err(|e| {
            ConfigError::new(ConfigErrorKind::NotFound, e.to_string())
                .at(example.display().to_string())
        })?;
        return Ok((text, example.display().to_string()));
    }

    Err(ConfigError::new(
        ConfigErrorKind::NotFound,
        format!(
            "configuration file not found and no example configuration available at {}",
            example.display()
        ),
    )
    .at(path.display().to_string()))
}
