//! `rtgs_server`
//!
//! Server-side systems:
//! - Session registry keyed by datagram source address
//! - Spawn policy for newly observed peers
//! - Ingress loop (liveness), broadcast loop (snapshots), eviction loop
//! - Periodic diagnostics dump
//!
//! Networking model:
//! - UDP only; server -> client carries state, client -> server carries
//!   liveness.

pub mod diagnostics;
pub mod registry;
pub mod server;
pub mod spawn;

pub use registry::{Endpoint, Session, SessionRegistry};
pub use server::{ServerHandle, SyncServer};
pub use spawn::SpawnPolicy;
