use std::time::Duration;

use rtgs_server::server::bind_ephemeral;
use rtgs_shared::config::ServerConfig;

/// Smoke test: server tasks run a few ticks with nobody connected.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let server = bind_ephemeral(ServerConfig {
        broadcast_interval_ms: 10,
        eviction_interval_ms: 10,
        diagnostics_interval_ms: 10,
        ..Default::default()
    })
    .await?;
    let handle = server.spawn();
    assert!(handle.local_addr().is_some());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.registry().is_empty());
    handle.shutdown();
    Ok(())
}
