//! Prometheus metrics exposition for the health aggregator's `/metrics`
//! endpoint (component F). Metric names and label keys are carried over
//! verbatim from the reference health-check sidecar's hand-built exposition
//! text; here they are registered and rendered through the `prometheus`
//! crate instead of string-joined by hand.

use crate::resources::ResourceSnapshot;
use crate::supervisor::{ChildStatus, ProcessState};
use prometheus::{Counter, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

/// Owns one private `Registry` (not the process-global default) so that
/// a `MetricsRegistry` can be constructed freely in tests without
/// colliding with another instance's registrations.
pub struct MetricsRegistry {
    registry: Registry,
    cpu_percent: Gauge,
    memory_percent: Gauge,
    process_count: Gauge,
    uptime_seconds: Counter,
    server_status: GaugeVec,
    process_running: GaugeVec,
    process_restart_count: GaugeVec,
    process_uptime_seconds: GaugeVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let cpu_percent = Gauge::with_opts(Opts::new("mcpo_cpu_percent", "CPU usage percentage"))
            .expect("static metric options are valid");
        let memory_percent =
            Gauge::with_opts(Opts::new("mcpo_memory_percent", "Memory usage percentage"))
                .expect("static metric options are valid");
        let process_count = Gauge::with_opts(Opts::new(
            "mcpo_process_count",
            "Number of processes",
        ))
        .expect("static metric options are valid");
        let uptime_seconds = Counter::with_opts(Opts::new(
            "mcpo_uptime_seconds",
            "Container uptime in seconds",
        ))
        .expect("static metric options are valid");
        let server_status = GaugeVec::new(
            Opts::new(
                "mcpo_server_status",
                "MCP server status (1=healthy, 0=unhealthy)",
            ),
            &["server"],
        )
        .expect("static metric options are valid");
        let process_running = GaugeVec::new(
            Opts::new(
                "mcpo_process_running",
                "Process running status (1=running, 0=stopped)",
            ),
            &["process"],
        )
        .expect("static metric options are valid");
        let process_restart_count = GaugeVec::new(
            Opts::new("mcpo_process_restart_count", "Process restart count"),
            &["process"],
        )
        .expect("static metric options are valid");
        let process_uptime_seconds = GaugeVec::new(
            Opts::new(
                "mcpo_process_uptime_seconds",
                "Process uptime in seconds",
            ),
            &["process"],
        )
        .expect("static metric options are valid");

        for collector in [
            Box::new(cpu_percent.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(memory_percent.clone()),
            Box::new(process_count.clone()),
            Box::new(uptime_seconds.clone()),
            Box::new(server_status.clone()),
            Box::new(process_running.clone()),
            Box::new(process_restart_count.clone()),
            Box::new(process_uptime_seconds.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric name collisions are a programming error");
        }

        Self {
            registry,
            cpu_percent,
            memory_percent,
            process_count,
            uptime_seconds,
            server_status,
            process_running,
            process_restart_count,
            process_uptime_seconds,
        }
    }

    /// Overwrite the gauges with a fresh host resource sample and the
    /// uptime counter with the elapsed seconds since process start. The
    /// counter is `set()` rather than accumulated because the underlying
    /// value (`Instant::elapsed`) is already monotonic and absolute;
    /// incrementing by the delta each call would double-count.
    pub fn record_resources(&self, snapshot: &ResourceSnapshot, uptime_secs: f64) {
        self.cpu_percent.set(snapshot.cpu_percent);
        self.memory_percent.set(snapshot.memory_percent);
        self.process_count.set(snapshot.process_count as f64);
        let delta = uptime_secs - self.uptime_seconds.get();
        if delta > 0.0 {
            self.uptime_seconds.inc_by(delta);
        }
    }

    /// Record per-upstream healthy/unhealthy state as reported by the
    /// probe loop (disabled upstreams never reach the probe loop and are
    /// simply absent from this series, as `health_check.py` leaves them
    /// present with a fixed `healthy: true` — the probe-derived value is
    /// set directly here, disabled-ness is a concern of `/health`'s body,
    /// not this series).
    pub fn record_server_status(&self, name: &str, healthy: bool) {
        self.server_status
            .with_label_values(&[name])
            .set(if healthy { 1.0 } else { 0.0 });
    }

    /// Record the supervisor's view of every tracked `command` upstream.
    pub fn record_processes(&self, children: &[ChildStatus]) {
        for child in children {
            let running = matches!(child.state, ProcessState::Running);
            self.process_running
                .with_label_values(&[&child.name])
                .set(if running { 1.0 } else { 0.0 });
            self.process_restart_count
                .with_label_values(&[&child.name])
                .set(child.restart_count as f64);
            self.process_uptime_seconds
                .with_label_values(&[&child.name])
                .set(child.start_time.elapsed().as_secs_f64());
        }
    }

    /// Render the current state as Prometheus text exposition format.
    pub fn render(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .expect("text encoding never fails for well-formed metric families");
        buffer
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn render_includes_registered_series_names() {
        let metrics = MetricsRegistry::new();
        metrics.record_resources(
            &ResourceSnapshot {
                cpu_percent: 12.5,
                memory_percent: 30.0,
                process_count: 42,
                disk_percent: 10.0,
            },
            5.0,
        );
        metrics.record_server_status("echo", true);
        metrics.record_processes(&[ChildStatus {
            name: "echo".to_string(),
            pid: Some(1234),
            start_time: Instant::now(),
            restart_count: 0,
            state: ProcessState::Running,
        }]);

        let text = String::from_utf8(metrics.render()).unwrap();
        assert!(text.contains("mcpo_cpu_percent 12.5"));
        assert!(text.contains("mcpo_server_status{server=\"echo\"} 1"));
        assert!(text.contains("mcpo_process_running{process=\"echo\"} 1"));
    }
}
