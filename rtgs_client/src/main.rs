//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p rtgs_client -- [--config client.json] [--server 127.0.0.1:8888] [--heartbeat-ms 2000]
//!
//! The client announces itself with periodic heartbeats and logs a summary of
//! the mirrored world. Rendering is left to embedders of the library.

use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;
use rtgs_client::SyncClient;
use rtgs_shared::config::ClientConfig;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = PathBuf::from(&args[i + 1]);
            ClientConfig::load(&path).with_context(|| format!("load {}", path.display()))?
        }
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => i += 2,
            "--server" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--heartbeat-ms" if i + 1 < args.len() => {
                cfg.heartbeat_interval_ms = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --heartbeat-ms {}", args[i + 1]))?;
                i += 2;
            }
            "--stale-ms" if i + 1 < args.len() => {
                cfg.stale_after_ms = Some(
                    args[i + 1]
                        .parse()
                        .with_context(|| format!("invalid --stale-ms {}", args[i + 1]))?,
                );
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
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, "Starting client");

    let client = SyncClient::connect(cfg).await.context("connect")?;
    info!(local = %client.local_addr()?, server = %client.server_addr(), "Socket ready");
    let handle = client.spawn();

    // Stand-in for a render loop: read the mirror once per "frame".
    let mut frame = tokio::time::interval(Duration::from_secs(1));
    loop {
        frame.tick().await;
        let users = handle.mirror().list();
        info!(users = users.len(), "World state");
        for u in &users {
            info!(
                id = %u.id,
                kind = %u.kind,
                x = u.location.x,
                y = u.location.y,
                z = u.location.z,
                orientation = u.orientation,
                active = u.active,
                "Participant"
            );
        }
    }
}
