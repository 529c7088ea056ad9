//! Networking primitives.
//!
//! - Wire codec for the server -> client `world_update` message.
//! - Liveness heartbeat payload for the client -> server direction.
//! - A datagram transport trait so loops can run over UDP or a simulated
//!   network.
//!
//! Delivery is best-effort: no acknowledgment, no ordering, no retries.

use std::{io, net::SocketAddr};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use crate::{
    math::Vec3,
    participant::{Participant, ParticipantKind},
};

/// Default UDP port for the sync server.
pub const DEFAULT_PORT: u16 = 8888;

/// Message kind discriminator of the world snapshot.
pub const WORLD_UPDATE: &str = "world_update";

/// Largest payload that fits in a single IPv4 UDP datagram.
pub const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoded message is {len} bytes, limit is {max}")]
    Oversized { len: usize, max: usize },
}

/// Per-participant record inside a `world_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub id: String,
    pub user_type: ParticipantKind,
    pub location: Vec3,
    pub orientation: f32,
    pub is_active: bool,
}

impl From<&Participant> for UserUpdate {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.clone(),
            user_type: p.kind.clone(),
            location: p.location,
            orientation: p.orientation,
            is_active: p.active,
        }
    }
}

impl From<UserUpdate> for Participant {
    fn from(u: UserUpdate) -> Self {
        Self {
            id: u.id,
            kind: u.user_type,
            location: u.location,
            orientation: u.orientation,
            active: u.is_active,
        }
    }
}

/// World snapshot as broadcast by the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldUpdate {
    pub users: Vec<UserUpdate>,
}

impl WorldUpdate {
    pub fn from_participants<'a>(participants: impl IntoIterator<Item = &'a Participant>) -> Self {
        Self {
            users: participants.into_iter().map(UserUpdate::from).collect(),
        }
    }
}

/// A decoded server -> client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    WorldUpdate(WorldUpdate),
    /// Well-formed message of a kind this build does not act on.
    Other { kind: String },
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    users: &'a [UserUpdate],
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    users: Vec<UserUpdate>,
}

/// Encodes a snapshot into one datagram payload.
pub fn encode_world_update(update: &WorldUpdate) -> Result<Bytes, CodecError> {
    let payload = serde_json::to_vec(&OutboundEnvelope {
        kind: WORLD_UPDATE,
        users: &update.users,
    })?;
    if payload.len() > MAX_DATAGRAM {
        return Err(CodecError::Oversized {
            len: payload.len(),
            max: MAX_DATAGRAM,
        });
    }
    Ok(Bytes::from(payload))
}

/// Decodes a server datagram. Unknown message kinds are not an error.
pub fn decode_server_message(b: &[u8]) -> Result<ServerMessage, CodecError> {
    let env: InboundEnvelope = serde_json::from_slice(b)?;
    if env.kind == WORLD_UPDATE {
        Ok(ServerMessage::WorldUpdate(WorldUpdate { users: env.users }))
    } else {
        Ok(ServerMessage::Other { kind: env.kind })
    }
}

/// Client -> server liveness payload. The server never parses it.
pub fn heartbeat_payload(seq: u64) -> Bytes {
    Bytes::from(format!("Message {seq}"))
}

/// Connectionless datagram transport.
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl DatagramSocket for UdpSocket {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Binds a UDP socket.
pub async fn bind_udp(addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .with_context(|| format!("udp bind {addr}"))
}
