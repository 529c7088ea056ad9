//! Configuration system.
//!
//! Server and client configuration, loadable from JSON strings/files.
//! Every field has a default so partial documents are accepted.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    net::{DEFAULT_PORT, MAX_DATAGRAM},
    participant::ParticipantKind,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid spawn bounds on {axis} axis: [{min}, {max}]")]
    InvalidBounds { axis: char, min: f32, max: f32 },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("recv_buffer is {len} bytes, snapshots may be up to {min}")]
    BufferTooSmall { len: usize, min: usize },
}

/// Axis-aligned spawn volume, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl SpawnBounds {
    pub fn new(
        min_x: f32,
        max_x: f32,
        min_y: f32,
        max_y: f32,
        min_z: f32,
        max_z: f32,
    ) -> Result<Self, ConfigError> {
        let bounds = Self {
            min_x,
            max_x,
            min_y,
            max_y,
            min_z,
            max_z,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, min, max) in [
            ('x', self.min_x, self.max_x),
            ('y', self.min_y, self.max_y),
            ('z', self.min_z, self.max_z),
        ] {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(ConfigError::InvalidBounds { axis, min, max });
            }
        }
        Ok(())
    }
}

impl Default for SpawnBounds {
    /// A 10x10 floor at height zero.
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 10.0,
            min_y: 0.0,
            max_y: 0.0,
            min_z: 0.0,
            max_z: 10.0,
        }
    }
}

/// Sync server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind, IPv4 wildcard by default.
    pub bind_ip: IpAddr,
    pub port: u16,
    pub broadcast_interval_ms: u64,
    pub eviction_interval_ms: u64,
    /// Sessions silent for longer than this are evicted.
    pub session_timeout_ms: u64,
    /// Period of the registry dump; `0` disables it.
    pub diagnostics_interval_ms: u64,
    pub spawn_bounds: SpawnBounds,
    pub spawn_kind: ParticipantKind,
    /// Receive buffer size; longer datagrams are truncated.
    pub recv_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            broadcast_interval_ms: 100,
            eviction_interval_ms: 10_000,
            session_timeout_ms: 30_000,
            diagnostics_interval_ms: 15_000,
            spawn_bounds: SpawnBounds::default(),
            spawn_kind: ParticipantKind::Player,
            recv_buffer: 1024,
        }
    }
}

impl ServerConfig {
    /// Parses and validates config from JSON.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json_str(&read_file(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("broadcast_interval_ms"));
        }
        if self.eviction_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("eviction_interval_ms"));
        }
        if self.session_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("session_timeout_ms"));
        }
        if self.recv_buffer == 0 {
            return Err(ConfigError::ZeroValue("recv_buffer"));
        }
        self.spawn_bounds.validate()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn diagnostics_interval(&self) -> Option<Duration> {
        (self.diagnostics_interval_ms > 0).then(|| Duration::from_millis(self.diagnostics_interval_ms))
    }
}

/// Sync client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:8888`.
    pub server_addr: String,
    pub heartbeat_interval_ms: u64,
    /// Must hold the largest snapshot the server may send.
    pub recv_buffer: usize,
    /// When set, mirror entries not refreshed within this window are pruned.
    pub stale_after_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            heartbeat_interval_ms: 2_000,
            recv_buffer: MAX_DATAGRAM,
            stale_after_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json_str(&read_file(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("heartbeat_interval_ms"));
        }
        if self.recv_buffer < MAX_DATAGRAM {
            return Err(ConfigError::BufferTooSmall {
                len: self.recv_buffer,
                min: MAX_DATAGRAM,
            });
        }
        if self.stale_after_ms == Some(0) {
            return Err(ConfigError::ZeroValue("stale_after_ms"));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_ms.map(Duration::from_millis)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
