//! `rtgs_tests`
//!
//! In-memory datagram network with injectable faults, so sync behaviour can
//! be exercised under loss, reordering and unreachable peers without real
//! sockets.

use std::{
    collections::{HashMap, HashSet},
    io,
    net::SocketAddr,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rtgs_shared::net::DatagramSocket;
use tokio::sync::mpsc;
use tracing::trace;

type Datagram = (Vec<u8>, SocketAddr);

/// Fault injection applied to every datagram on the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Drop every n-th datagram sent (counting from 1).
    pub drop_every: Option<u64>,
    /// Deliver each consecutive pair of datagrams in reverse order.
    pub reorder_pairs: bool,
}

#[derive(Default)]
struct Inner {
    mailboxes: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    unreachable: HashSet<SocketAddr>,
    faults: Faults,
    sent: u64,
    dropped: u64,
    held: Option<(SocketAddr, Datagram)>,
}

/// Shared medium connecting `SimSocket`s.
#[derive(Default)]
pub struct SimNetwork {
    inner: Mutex<Inner>,
}

impl SimNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches a socket at `addr`, replacing any previous one.
    pub fn bind(self: &Arc<Self>, addr: SocketAddr) -> SimSocket {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().mailboxes.insert(addr, tx);
        SimSocket {
            addr,
            net: Arc::clone(self),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        let mut inner = self.inner.lock();
        inner.faults = faults;
        if !faults.reorder_pairs {
            if let Some((to, dgram)) = inner.held.take() {
                Self::deliver(&inner, to, dgram);
            }
        }
    }

    /// Sends to `addr` fail with `ConnectionRefused` while set.
    pub fn set_unreachable(&self, addr: SocketAddr, unreachable: bool) {
        let mut inner = self.inner.lock();
        if unreachable {
            inner.unreachable.insert(addr);
        } else {
            inner.unreachable.remove(&addr);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    fn send(&self, from: SocketAddr, to: SocketAddr, payload: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.unreachable.contains(&to) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{to} unreachable"),
            ));
        }

        inner.sent += 1;
        if let Some(n) = inner.faults.drop_every {
            if n > 0 && inner.sent % n == 0 {
                inner.dropped += 1;
                trace!(%from, %to, "Datagram dropped");
                return Ok(payload.len());
            }
        }

        let dgram = (payload.to_vec(), from);
        if inner.faults.reorder_pairs {
            match inner.held.take() {
                None => inner.held = Some((to, dgram)),
                Some((held_to, held)) => {
                    Self::deliver(&inner, to, dgram);
                    Self::deliver(&inner, held_to, held);
                }
            }
        } else {
            Self::deliver(&inner, to, dgram);
        }
        Ok(payload.len())
    }

    // Unbound targets swallow the datagram, as UDP would.
    fn deliver(inner: &Inner, to: SocketAddr, dgram: Datagram) {
        if let Some(tx) = inner.mailboxes.get(&to) {
            let _ = tx.send(dgram);
        }
    }
}

/// Endpoint on a `SimNetwork`.
pub struct SimSocket {
    addr: SocketAddr,
    net: Arc<SimNetwork>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

#[async_trait]
impl DatagramSocket for SimSocket {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.net.send(self.addr, target, payload)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (payload, from) = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "network closed"))?;
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok((n, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}
