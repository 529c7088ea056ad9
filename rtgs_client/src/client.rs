//! Client implementation.
//!
//! The client maintains:
//! - One datagram socket addressed at the server
//! - A heartbeat task (client -> server liveness)
//! - A receive task merging snapshots into the `ClientMirror`
//! - Optional pruning of mirror entries that stopped being refreshed

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use rtgs_shared::{
    config::ClientConfig,
    net::{bind_udp, heartbeat_payload, DatagramSocket},
};
use tokio::{net::UdpSocket, task::JoinHandle, time};
use tracing::{debug, info, warn};

use crate::mirror::ClientMirror;

/// World-sync client over any datagram transport.
pub struct SyncClient<S: DatagramSocket = UdpSocket> {
    cfg: ClientConfig,
    server: SocketAddr,
    socket: Arc<S>,
    mirror: Arc<ClientMirror>,
}

impl SyncClient<UdpSocket> {
    /// Resolves the server address and binds a local socket of the same family.
    pub async fn connect(cfg: ClientConfig) -> anyhow::Result<Self> {
        cfg.validate().context("invalid client config")?;
        let server = tokio::net::lookup_host(&cfg.server_addr)
            .await
            .with_context(|| format!("resolve {}", cfg.server_addr))?
            .next()
            .with_context(|| format!("no address for {}", cfg.server_addr))?;
        let any: IpAddr = if server.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = bind_udp(SocketAddr::new(any, 0)).await?;
        Ok(Self::with_socket(cfg, server, socket))
    }
}

impl<S: DatagramSocket> SyncClient<S> {
    pub fn with_socket(cfg: ClientConfig, server: SocketAddr, socket: S) -> Self {
        Self {
            cfg,
            server,
            socket: Arc::new(socket),
            mirror: Arc::new(ClientMirror::new()),
        }
    }

    pub fn mirror(&self) -> &Arc<ClientMirror> {
        &self.mirror
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr().context("local addr")
    }

    /// Sends heartbeat number `seq`.
    pub async fn send_heartbeat(&self, seq: u64) -> anyhow::Result<()> {
        self.socket
            .send_to(&heartbeat_payload(seq), self.server)
            .await
            .context("udp send")?;
        Ok(())
    }

    /// Receives one datagram and merges it. Returns the number of entries
    /// applied; datagrams from other sources are dropped.
    pub async fn recv_once(&self, buf: &mut [u8]) -> anyhow::Result<Option<usize>> {
        let (n, from) = self.socket.recv_from(buf).await.context("udp recv")?;
        if from != self.server {
            debug!(%from, "Ignoring datagram from unexpected peer");
            return Ok(None);
        }
        Ok(self.mirror.apply_datagram(&buf[..n]))
    }

    async fn receive_loop(&self) {
        let mut buf = vec![0u8; self.cfg.recv_buffer];
        loop {
            if let Err(e) = self.recv_once(&mut buf).await {
                warn!(error = %e, "Receive error");
            }
        }
    }

    async fn heartbeat_loop(&self) {
        let mut ticker = time::interval(self.cfg.heartbeat_interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        let mut seq = 1;
        loop {
            ticker.tick().await;
            match self.send_heartbeat(seq).await {
                Ok(()) => {
                    debug!(seq, "Heartbeat sent");
                    seq += 1;
                }
                Err(e) => warn!(error = %e, "Send error"),
            }
        }
    }

    async fn prune_loop(&self, max_age: Duration) {
        let mut ticker = time::interval(max_age);
        loop {
            ticker.tick().await;
            for id in self.mirror.prune_stale(max_age) {
                info!(%id, "Pruned stale participant");
            }
        }
    }

    /// Starts the heartbeat, receive and (if configured) prune tasks.
    pub fn spawn(self) -> ClientHandle {
        let mirror = Arc::clone(&self.mirror);
        let stale_after = self.cfg.stale_after();
        let client = Arc::new(self);

        let mut tasks = Vec::with_capacity(3);
        let c = Arc::clone(&client);
        tasks.push(tokio::spawn(async move { c.receive_loop().await }));
        let c = Arc::clone(&client);
        tasks.push(tokio::spawn(async move { c.heartbeat_loop().await }));
        if let Some(max_age) = stale_after {
            let c = Arc::clone(&client);
            tasks.push(tokio::spawn(async move { c.prune_loop(max_age).await }));
        }

        info!(server = %client.server, "Sync client started");
        ClientHandle { mirror, tasks }
    }
}

/// Running client tasks. Dropping the handle aborts them.
pub struct ClientHandle {
    mirror: Arc<ClientMirror>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientHandle {
    /// The mirror the rendering side reads from.
    pub fn mirror(&self) -> &Arc<ClientMirror> {
        &self.mirror
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        for t in &self.tasks {
            t.abort();
        }
    }
}
