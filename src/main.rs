//! Only1MCP — an HTTP gateway that fans requests out to many MCP
//! upstreams behind a single address, with a sidecar health aggregator
//! for container orchestration.

use clap::{Parser, Subcommand};
use only1mcp::config;
use only1mcp::daemon::signals::setup_signal_handlers;
use only1mcp::health::{HealthAggregator, HealthServer};
use only1mcp::proxy::registry::Registry;
use only1mcp::proxy::ProxyServer;
use only1mcp::supervisor::Supervisor;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "only1mcp")]
#[command(about = "A unified HTTP gateway for Model Context Protocol servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the gateway's configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "/app/config.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (the default when no subcommand is given)
    Start {
        /// Overrides `proxy.host` from the configuration file
        #[arg(long)]
        host: Option<String>,

        /// Overrides `proxy.port` from the configuration file
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Resolve and validate a configuration file without starting anything
    Validate {
        /// Configuration file to validate
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command.unwrap_or(Commands::Start { host: None, port: None }) {
        Commands::Validate { path } => run_validate(&path),
        Commands::Start { host, port } => run_start(&cli.config, host, port).await,
    }
}

fn run_validate(path: &PathBuf) -> ExitCode {
    match config::resolve(path) {
        Ok(resolved) => {
            info!(path = %path.display(), upstreams = resolved.upstreams.len(), "configuration is valid");
            println!(
                "configuration at {} is valid ({} upstream(s))",
                path.display(),
                resolved.upstreams.len()
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(error = %e, "configuration is invalid");
            eprintln!("configuration error: {e}");
            ExitCode::FAILURE
        },
    }
}

async fn run_start(config_path: &PathBuf, host: Option<String>, port: Option<u16>) -> ExitCode {
    let mut resolved = match config::resolve(config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Some(host) = host {
        resolved.proxy.host = host;
    }
    if let Some(port) = port {
        resolved.proxy.port = port;
    }
    let config = Arc::new(resolved);

    let supervisor = Arc::new(Supervisor::new());
    if let Err(e) = supervisor.start_all(&config).await {
        error!(error = %e, "failed to start supervised upstreams");
        eprintln!("startup error: {e}");
        return ExitCode::FAILURE;
    }
    supervisor.spawn_monitor();

    let registry = match Registry::build(&config, supervisor.clone()) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!(error = %e, "failed to build upstream registry");
            eprintln!("startup error: {e}");
            supervisor.stop_all(true).await;
            return ExitCode::FAILURE;
        },
    };

    let (shutdown_tx, _shutdown_rx) = setup_signal_handlers();
    let proxy_shutdown_rx = shutdown_tx.subscribe();
    let health_shutdown_rx = shutdown_tx.subscribe();

    let proxy_server = ProxyServer::new(&config, registry);
    let aggregator = Arc::new(HealthAggregator::new(config.clone(), supervisor.clone()));
    aggregator.spawn_probe_loop();
    let health_server = HealthServer::new(&config, aggregator);

    info!(
        proxy_host = %config.proxy.host,
        proxy_port = config.proxy.port,
        health_host = %config.health.host,
        health_port = config.health.port,
        "starting only1mcp gateway"
    );

    let proxy_handle = tokio::spawn(async move { proxy_server.run(proxy_shutdown_rx).await });
    let health_handle = tokio::spawn(async move { health_server.run(health_shutdown_rx).await });

    let (proxy_result, health_result) = tokio::join!(proxy_handle, health_handle);

    info!("shutting down supervised upstreams");
    supervisor.stop_all(true).await;

    match (proxy_result, health_result) {
        (Ok(Ok(())), Ok(Ok(()))) => ExitCode::SUCCESS,
        (Ok(Err(e)), _) | (_, Ok(Err(e))) => {
            error!(error = %e, "a server task failed to bind or serve");
            ExitCode::FAILURE
        },
        _ => {
            error!("a server task panicked");
            ExitCode::FAILURE
        },
    }
}
