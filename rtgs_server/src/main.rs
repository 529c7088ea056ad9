//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p rtgs_server -- [--config server.json] [--bind 0.0.0.0] [--port 8888]
//!
//! The server accepts datagrams from any peer, spawns a participant for every
//! new sender, and broadcasts the world state to all known peers.

use std::{env, net::IpAddr, path::PathBuf};

use anyhow::Context;
use rtgs_server::SyncServer;
use rtgs_shared::config::ServerConfig;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    // The config file is the base; flags override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = PathBuf::from(&args[i + 1]);
            ServerConfig::load(&path).with_context(|| format!("load {}", path.display()))?
        }
        _ => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => i += 2,
            "--bind" if i + 1 < args.len() => {
                cfg.bind_ip = args[i + 1]
                    .parse::<IpAddr>()
                    .with_context(|| format!("invalid --bind {}", args[i + 1]))?;
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.port = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --port {}", args[i + 1]))?;
                i += 2;
            }
            other => {
                warn!(arg = %other, "Ignoring unknown argument");
                i += 1;
            }
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("=== RTGS Server ===");

    let cfg = parse_args()?;
    info!(addr = %cfg.listen_addr(), timeout_ms = cfg.session_timeout_ms, "Starting server");

    let server = SyncServer::bind(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    server.spawn().wait().await
}
