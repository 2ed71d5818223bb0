//! Process supervisor (component C). Owns child processes for `command`
//! upstreams, restarts them per policy, and publishes a read-only status
//! snapshot consumed by the registry (D) and the health aggregator (F).
//!
//! Grounded on `process_monitor.py`'s restart state machine and the
//! teacher's `tokio::process::Command` spawn style.

use crate::config::{ResolvedConfig, UpstreamSpec};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RESTARTS: u32 = 3;
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Exited,
    GivenUp,
}

/// Owned (not aliased) view of one child's status, handed out by
/// `Supervisor::snapshot` so that callers never hold a pipe handle across
/// a restart.
#[derive(Debug, Clone)]
pub struct ChildStatus {
    pub name: String,
    pub pid: Option<u32>,
    pub start_time: Instant,
    pub restart_count: u32,
    pub state: ProcessState,
}

/// The live pipe pair for one running child, held behind a single mutex
/// so that a write-then-read round trip is one atomic critical section —
/// concurrent callers queue in FIFO order rather than interleaving a
/// second caller's write between the first's write and read.
pub type ChildIo = (ChildStdin, BufReader<ChildStdout>);

#[derive(Clone)]
pub struct ChildPipes {
    pub io: Arc<AsyncMutex<ChildIo>>,
}

struct ManagedChild {
    argv: Vec<String>,
    env: HashMap<String, String>,
    child: Option<Child>,
    pipes: Option<ChildPipes>,
    pid: Option<u32>,
    start_time: Instant,
    restart_count: u32,
    state: ProcessState,
    stderr_drain: Option<JoinHandle<()>>,
}

/// Owns every `command` upstream's child process and restart bookkeeping.
/// The `name -> ManagedChild` map is guarded by one `DashMap` shard lock
/// per entry; no I/O is ever performed while a shard lock is held — state
/// is cloned out (see `snapshot`/`pipes`), the lock released, then acted
/// on.
pub struct Supervisor {
    children: DashMap<String, ManagedChild>,
    max_restarts: u32,
    restart_delay: Duration,
    check_interval: Duration,
    monitor: AsyncMutex<Option<JoinHandle<()>>>,
    stopping: Arc<std::sync::atomic::AtomicBool>,
    given_up_count: AtomicU32,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            children: DashMap::new(),
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_delay: DEFAULT_RESTART_DELAY,
            check_interval: DEFAULT_CHECK_INTERVAL,
            monitor: AsyncMutex::new(None),
            stopping: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            given_up_count: AtomicU32::new(0),
        }
    }

    /// Start every enabled `command` upstream in configuration order.
    pub async fn start_all(self: &Arc<Self>, config: &ResolvedConfig) -> Result<()> {
        for (name, spec) in &config.upstreams {
            let UpstreamSpec::Command {
                command,
                args,
                env,
                disabled,
                ..
            } = spec
            else {
                continue;
            };
            if *disabled {
                info!(upstream = %name, "skipping disabled command upstream");
                continue;
            }
            self.launch(name, command, args, env).await?;
        }
        Ok(())
    }

    async fn launch(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<()> {
        let composed_env = compose_child_env(env);

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(composed_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Internal(format!("failed to launch upstream '{name}': {e}"))
        })?;

        let pid = child.id();
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let managed = ManagedChild {
            argv: std::iter::once(command.to_string())
                .chain(args.iter().cloned())
                .collect(),
            env: composed_env,
            child: Some(child),
            pipes: Some(ChildPipes {
                io: Arc::new(AsyncMutex::new((stdin, BufReader::new(stdout)))),
            }),
            pid,
            start_time: Instant::now(),
            restart_count: 0,
            state: ProcessState::Running,
            stderr_drain: None,
        };

        info!(upstream = %name, pid = ?pid, "upstream process started");
        self.children.insert(name.to_string(), managed);
        Ok(())
    }

    /// Start the background supervision loop. Runs on its own task with
    /// period `check_interval`; stopped explicitly before `stop_all` to
    /// avoid a race re-launch during shutdown.
    pub fn spawn_monitor(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.check_interval);
            loop {
                ticker.tick().await;
                if this.stopping.load(Ordering::Relaxed) {
                    break;
                }
                this.check_once().await;
            }
        });
        tokio::spawn({
            let this = Arc::clone(self);
            async move {
                *this.monitor.lock().await = Some(handle);
            }
        });
    }

    async fn check_once(self: &Arc<Self>) {
        let names: Vec<String> = self.children.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.check_child(&name).await;
        }
    }

    async fn check_child(self: &Arc<Self>, name: &str) {
        let exited = {
            let mut entry = match self.children.get_mut(name) {
                Some(e) => e,
                None => return,
            };
            if entry.state != ProcessState::Running {
                return;
            }
            match entry.child.as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(Some(_status)) => true,
                    Ok(None) => false,
                    Err(e) => {
                        warn!(upstream = %name, error = %e, "failed to poll child status");
                        false
                    },
                },
                None => true,
            }
        };

        if !exited {
            return;
        }

        let (restart_count, argv, env) = {
            let mut entry = self.children.get_mut(name).expect("checked above");
            entry.state = ProcessState::Exited;
            entry.pipes = None;
            entry.child = None;
            (entry.restart_count, entry.argv.clone(), entry.env.clone())
        };

        if restart_count < self.max_restarts {
            warn!(
                upstream = %name,
                attempt = restart_count + 1,
                max = self.max_restarts,
                "upstream exited, scheduling restart"
            );
            tokio::time::sleep(self.restart_delay).await;

            let Some((command, args)) = argv.split_first() else {
                return;
            };
            match self.relaunch(name, command, args, &env).await {
                Ok(()) => {},
                Err(e) => error!(upstream = %name, error = %e, "restart attempt failed"),
            }
        } else {
            if let Some(mut entry) = self.children.get_mut(name) {
                entry.state = ProcessState::GivenUp;
            }
            self.given_up_count.fetch_add(1, Ordering::Relaxed);
            error!(
                upstream = %name,
                restarts = restart_count,
                "upstream has been restarted too many times, giving up"
            );
        }
    }

    async fn relaunch(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<()> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Internal(format!("failed to relaunch '{name}': {e}")))?;
        let pid = child.id();
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        if let Some(mut entry) = self.children.get_mut(name) {
            entry.child = Some(child);
            entry.pipes = Some(ChildPipes {
                io: Arc::new(AsyncMutex::new((stdin, BufReader::new(stdout)))),
            });
            entry.pid = pid;
            entry.start_time = Instant::now();
            entry.restart_count += 1;
            entry.state = ProcessState::Running;
        }
        info!(upstream = %name, pid = ?pid, "upstream process restarted");
        Ok(())
    }

    /// Owned pipe handles for a running child, or `None` if it is
    /// `Exited`/`GivenUp`/unknown. The command driver clones the `Arc`s
    /// out and never holds the map entry across an `await`.
    pub fn pipes(&self, name: &str) -> Option<ChildPipes> {
        let entry = self.children.get(name)?;
        if entry.state != ProcessState::Running {
            return None;
        }
        entry.pipes.clone()
    }

    pub fn state(&self, name: &str) -> Option<ProcessState> {
        self.children.get(name).map(|e| e.state)
    }

    /// Read-only snapshot of every tracked child, values not aliases.
    pub fn snapshot(&self) -> Vec<ChildStatus> {
        self.children
            .iter()
            .map(|e| ChildStatus {
                name: e.key().clone(),
                pid: e.pid,
                start_time: e.start_time,
                restart_count: e.restart_count,
                state: e.state,
            })
            .collect()
    }

    /// Whether any tracked child has reached the terminal `GivenUp`
    /// state — part of `is_healthy`'s definition.
    pub fn any_given_up(&self) -> bool {
        self.children
            .iter()
            .any(|e| e.state == ProcessState::GivenUp)
    }

    /// `ps -p <pid> -o %cpu,%mem --no-headers`, tolerant of failure.
    pub fn resource_usage(&self, name: &str, ps_path: &str) -> (f64, f64) {
        let Some(pid) = self.children.get(name).and_then(|e| e.pid) else {
            return (0.0, 0.0);
        };
        let output = std::process::Command::new(ps_path)
            .args(["-p", &pid.to_string(), "-o", "%cpu,%mem", "--no-headers"])
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                let mut parts = text.split_whitespace();
                let cpu = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
                let mem = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
                (cpu, mem)
            },
            _ => (0.0, 0.0),
        }
    }

    /// `stop_all(graceful)`: terminate every live child, wait up to 10s
    /// each, then kill survivors. The monitor loop is stopped first so it
    /// cannot race a shutdown with a restart.
    pub async fn stop_all(&self, graceful: bool) {
        self.stopping.store(true, Ordering::Relaxed);
        if let Some(handle) = self.monitor.lock().await.take() {
            handle.abort();
        }

        let names: Vec<String> = self.children.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.stop_one(&name, graceful).await;
        }
    }

    async fn stop_one(&self, name: &str, graceful: bool) {
        let mut child = {
            let mut entry = match self.children.get_mut(name) {
                Some(e) => e,
                None => return,
            };
            entry.pipes = None;
            match entry.child.take() {
                Some(c) => c,
                None => return,
            }
        };

        if graceful {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
            let waited = tokio::time::timeout(Duration::from_secs(10), child.wait()).await;
            if waited.is_err() {
                warn!(upstream = %name, "child ignored terminate signal, killing");
                let _ = child.kill().await;
            }
        } else {
            let _ = child.kill().await;
        }

        if let Some(mut entry) = self.children.get_mut(name) {
            entry.state = ProcessState::Exited;
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose the child's final environment: process environment ⊕ spec
/// `env` (spec wins). Within `env`, a value of the exact form `${NAME}`
/// is resolved against the process environment; if missing, the literal
/// string is kept and a warning logged. This is distinct from the
/// config resolver's whole-document substitution
/// (`config::validation::substitute_env_vars`), which fails fast on any
/// missing name instead.
fn compose_child_env(spec_env: &HashMap<String, String>) -> HashMap<String, String> {
    let mut composed: HashMap<String, String> = std::env::vars().collect();
    for (key, value) in spec_env {
        let resolved = if let Some(name) = value.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            match std::env::var(name) {
                Ok(v) => v,
                Err(_) => {
                    warn!(var = %name, "environment variable referenced in upstream env is unset, keeping literal");
                    value.clone()
                },
            }
        } else {
            value.clone()
        };
        composed.insert(key.clone(), resolved);
    }
    composed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_env_resolves_known_var() {
        std::env::set_var("SUPERVISOR_TEST_TK", "secret");
        let mut spec_env = HashMap::new();
        spec_env.insert("API_KEY".to_string(), "${SUPERVISOR_TEST_TK}".to_string());
        let composed = compose_child_env(&spec_env);
        assert_eq!(composed.get("API_KEY").unwrap(), "secret");
    }

    #[test]
    fn compose_env_keeps_literal_on_missing_var() {
        std::env::remove_var("SUPERVISOR_TEST_UNSET");
        let mut spec_env = HashMap::new();
        spec_env.insert("API_KEY".to_string(), "${SUPERVISOR_TEST_UNSET}".to_string());
        let composed = compose_child_env(&spec_env);
        assert_eq!(composed.get("API_KEY").unwrap(), "${SUPERVISOR_TEST_UNSET}");
    }

    #[tokio::test]
    async fn start_all_skips_disabled_and_non_command_upstreams() {
        use crate::config::{HealthConfig, ProxyConfig, ResolvedConfig, ResourcesConfig};
        use indexmap::IndexMap;

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
        upstreams.insert(
            "remote".to_string(),
            UpstreamSpec::Http {
                url: "http://localhost:1".to_string(),
                headers: HashMap::new(),
                disabled: false,
            },
        );
        let config = ResolvedConfig {
            upstreams,
            proxy: ProxyConfig::default(),
            health: HealthConfig::default(),
            resources: ResourcesConfig::default(),
        };

        let supervisor = Arc::new(Supervisor::new());
        supervisor.start_all(&config).await.unwrap();
        assert!(supervisor.snapshot().is_empty());
    }
}
