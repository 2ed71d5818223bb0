//! A Model Context Protocol gateway: one HTTP front-end fanning out to many
//! `command`/`streamable_http`/`sse` upstreams, plus a health aggregator
//! sidecar for container orchestration.

pub mod config;
pub mod daemon;
pub mod error;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod resources;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use config::ResolvedConfig;
pub use error::{Error, Result};
pub use proxy::server::ProxyServer;
