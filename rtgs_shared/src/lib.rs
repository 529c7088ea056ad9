//! `rtgs_shared`
//!
//! Shared libraries used by both the sync server and its clients.
//!
//! Design goals:
//! - One wire format, defined once (`net`).
//! - Transport behind a trait so loops can be driven by a simulated network.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;
pub mod participant;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::participant::*;
}
