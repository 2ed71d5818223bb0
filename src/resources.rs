//! Host resource sampling for the health aggregator (component F).
//!
//! Grounded on `health_check.py`'s `check_system_resources`: shell out to
//! `ps`/`df` rather than link a sampling library, and treat each sub-metric
//! independently — a failure on one (missing binary, unparsable output)
//! yields `0` for that metric and a logged warning, never a hard error.

use crate::config::ResourcesConfig;
use tracing::warn;

/// Host resource snapshot exposed via `/metrics` and folded into `/status`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub process_count: u64,
    pub disk_percent: f64,
}

/// Sample CPU, memory, process count, and disk usage via the configured
/// `ps`/`df` binaries. Linux-shaped invocation only (`--no-headers`); the
/// reference implementation's macOS branch has no counterpart here.
pub fn sample(config: &ResourcesConfig) -> ResourceSnapshot {
    ResourceSnapshot {
        cpu_percent: sample_ps_field(&config.ps_path, "pcpu"),
        memory_percent: sample_ps_field(&config.ps_path, "pmem"),
        process_count: sample_process_count(&config.ps_path),
        disk_percent: sample_disk_percent(&config.df_path, &config.mount_point),
    }
}

fn sample_ps_field(ps_path: &str, field: &str) -> f64 {
    let output = std::process::Command::new(ps_path)
        .args(["-eo", field, "--no-headers"])
        .output();
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<f64>().ok())
            .sum(),
        Ok(out) => {
            warn!(ps_path, field, status = ?out.status, "ps exited non-zero, reporting 0");
            0.0
        },
        Err(e) => {
            warn!(ps_path, field, error = %e, "failed to run ps, reporting 0");
            0.0
        },
    }
}

fn sample_process_count(ps_path: &str) -> u64 {
    let output = std::process::Command::new(ps_path)
        .args(["-e", "--no-headers"])
        .output();
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count() as u64,
        Ok(out) => {
            warn!(ps_path, status = ?out.status, "ps exited non-zero, reporting 0 processes");
            0
        },
        Err(e) => {
            warn!(ps_path, error = %e, "failed to run ps, reporting 0 processes");
            0
        },
    }
}

fn sample_disk_percent(df_path: &str, mount_point: &str) -> f64 {
    let output = std::process::Command::new(df_path)
        .args(["-h", mount_point])
        .output();
    let out = match output {
        Ok(out) if out.status.success() => out,
        Ok(out) => {
            warn!(df_path, mount_point, status = ?out.status, "df exited non-zero, reporting 0");
            return 0.0;
        },
        Err(e) => {
            warn!(df_path, mount_point, error = %e, "failed to run df, reporting 0");
            return 0.0;
        },
    };

    let text = String::from_utf8_lossy(&out.stdout);
    let data_line = match text.lines().nth(1) {
        Some(line) => line,
        None => {
            warn!(df_path, mount_point, "df produced no data line, reporting 0");
            return 0.0;
        },
    };

    data_line
        .split_whitespace()
        .find_map(|part| part.strip_suffix('%').and_then(|p| p.parse::<f64>().ok()))
        .unwrap_or_else(|| {
            warn!(df_path, mount_point, "could not find a percentage field in df output");
            0.0
        })
}
