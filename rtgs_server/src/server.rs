//! Server implementation.
//!
//! One ingress task reads the socket; independent periodic tasks broadcast
//! snapshots, evict silent sessions, and dump diagnostics. They share a single
//! `SessionRegistry` and never hold its lock across a send or receive.
//!
//! Client -> server datagrams are liveness only: any payload from an unseen
//! endpoint spawns a participant, and any payload from a known one refreshes
//! it.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use rtgs_shared::{
    config::ServerConfig,
    net::{bind_udp, encode_world_update, DatagramSocket, WorldUpdate},
};
use tokio::{
    net::UdpSocket,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    diagnostics,
    registry::{Endpoint, SessionRegistry},
    spawn::SpawnPolicy,
};

/// Outcome of one broadcast tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub participants: usize,
    pub sent: usize,
    pub failed: usize,
}

/// World-sync server over any datagram transport.
pub struct SyncServer<S: DatagramSocket = UdpSocket> {
    cfg: ServerConfig,
    socket: Arc<S>,
    registry: Arc<SessionRegistry>,
}

impl SyncServer<UdpSocket> {
    /// Validates `cfg` and binds the UDP socket. Failure here is fatal.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        cfg.validate().context("invalid server config")?;
        let socket = bind_udp(cfg.listen_addr()).await?;
        Ok(Self::with_socket(cfg, socket))
    }
}

impl<S: DatagramSocket> SyncServer<S> {
    pub fn with_socket(cfg: ServerConfig, socket: S) -> Self {
        let spawner = SpawnPolicy::new(cfg.spawn_bounds, cfg.spawn_kind.clone());
        Self {
            cfg,
            socket: Arc::new(socket),
            registry: Arc::new(SessionRegistry::new(spawner)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr().context("local addr")
    }

    /// Registers or refreshes the sender of one datagram. Returns `true` when
    /// this datagram created the session.
    pub fn handle_datagram(&self, from: Endpoint, payload: &[u8]) -> bool {
        let (session, is_new) = self.registry.observe(from);
        if is_new {
            if let Some(p) = &session.participant {
                info!(
                    endpoint = %from,
                    x = p.location.x,
                    y = p.location.y,
                    z = p.location.z,
                    orientation = p.orientation,
                    "New client spawned"
                );
            }
        }
        debug!(endpoint = %from, payload = %String::from_utf8_lossy(payload), "Datagram received");
        is_new
    }

    /// Receives one datagram and applies it to the registry.
    pub async fn recv_once(&self, buf: &mut [u8]) -> anyhow::Result<Endpoint> {
        let (n, from) = self.socket.recv_from(buf).await.context("udp recv")?;
        self.handle_datagram(from, &buf[..n]);
        Ok(from)
    }

    /// Encodes the current snapshot and sends it to every known endpoint.
    pub async fn broadcast_once(&self) -> BroadcastReport {
        let (participants, endpoints) = self.registry.snapshot_with_endpoints();
        let mut report = BroadcastReport {
            participants: participants.len(),
            ..Default::default()
        };

        let payload = match encode_world_update(&WorldUpdate::from_participants(&participants)) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, participants = participants.len(), "Failed to encode snapshot");
                return report;
            }
        };

        for endpoint in endpoints {
            match self.socket.send_to(&payload, endpoint).await {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(%endpoint, error = %e, "Broadcast send failed");
                }
            }
        }
        report
    }

    /// Evicts sessions idle beyond the configured timeout.
    pub fn evict_once(&self) -> Vec<Endpoint> {
        let removed = self.registry.evict(self.cfg.session_timeout());
        for endpoint in &removed {
            info!(%endpoint, "Client timeout");
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), remaining = self.registry.len(), "Eviction pass");
        }
        removed
    }

    pub fn diagnostics_report(&self) -> String {
        diagnostics::render(&self.registry.sessions(), Instant::now())
    }

    async fn ingress_loop(&self) {
        let mut buf = vec![0u8; self.cfg.recv_buffer];
        loop {
            if let Err(e) = self.recv_once(&mut buf).await {
                warn!(error = %e, "Read error");
            }
        }
    }

    async fn broadcast_loop(&self) {
        let mut ticker = ticker(self.cfg.broadcast_interval());
        loop {
            ticker.tick().await;
            self.broadcast_once().await;
        }
    }

    async fn eviction_loop(&self) {
        let mut ticker = ticker(self.cfg.eviction_interval());
        loop {
            ticker.tick().await;
            self.evict_once();
        }
    }

    async fn diagnostics_loop(&self, period: Duration) {
        let mut ticker = ticker(period);
        loop {
            ticker.tick().await;
            info!("\n{}", self.diagnostics_report());
        }
    }

    /// Starts the ingress, broadcast, eviction and diagnostics tasks.
    pub fn spawn(self) -> ServerHandle {
        let local_addr = self.socket.local_addr().ok();
        let registry = Arc::clone(&self.registry);
        let diagnostics = self.cfg.diagnostics_interval();
        let server = Arc::new(self);

        let mut tasks = Vec::with_capacity(4);
        let s = Arc::clone(&server);
        tasks.push(tokio::spawn(async move { s.ingress_loop().await }));
        let s = Arc::clone(&server);
        tasks.push(tokio::spawn(async move { s.broadcast_loop().await }));
        let s = Arc::clone(&server);
        tasks.push(tokio::spawn(async move { s.eviction_loop().await }));
        if let Some(period) = diagnostics {
            let s = Arc::clone(&server);
            tasks.push(tokio::spawn(async move { s.diagnostics_loop(period).await }));
        }

        info!(addr = ?local_addr, "Sync server started");
        ServerHandle {
            local_addr,
            registry,
            tasks,
        }
    }
}

/// First tick fires one full period after start.
fn ticker(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Running server tasks. Dropping the handle aborts them without draining.
pub struct ServerHandle {
    local_addr: Option<SocketAddr>,
    registry: Arc<SessionRegistry>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Read access for observers; the registry outlives the tasks.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Waits until the ingress task ends, which only happens on panic.
    pub async fn wait(mut self) -> anyhow::Result<()> {
        let mut tasks = std::mem::take(&mut self.tasks);
        if tasks.is_empty() {
            return Ok(());
        }
        let ingress = tasks.remove(0);
        let result = ingress.await.context("ingress task");
        for t in tasks {
            t.abort();
        }
        result
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        for t in &self.tasks {
            t.abort();
        }
    }
}

/// Helper for tests: bind to an ephemeral loopback port.
pub async fn bind_ephemeral(mut cfg: ServerConfig) -> anyhow::Result<SyncServer> {
    cfg.bind_ip = std::net::Ipv4Addr::LOCALHOST.into();
    cfg.port = 0;
    SyncServer::bind(cfg).await
}
