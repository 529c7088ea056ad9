//! `rtgs_client`
//!
//! Client-side systems:
//! - Liveness heartbeat towards the server
//! - Snapshot reception and merge into a local mirror
//! - Mirror queries for the rendering side (not part of this crate)

pub mod client;
pub mod mirror;

pub use client::{ClientHandle, SyncClient};
pub use mirror::{ClientMirror, MirrorEntry};
