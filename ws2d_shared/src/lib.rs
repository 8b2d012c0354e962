//! `ws2d_shared`
//!
//! I/O-free building blocks for the ws2d client.
//!
//! Design goals:
//! - Byte-exact wire format, isolated from transport concerns.
//! - Deterministic and testable without sockets or a display.
//! - No `unsafe`.

pub mod camera;
pub mod config;
pub mod packet;
pub mod surface;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::camera::*;
    pub use crate::config::*;
    pub use crate::packet::*;
    pub use crate::surface::*;
    pub use crate::world::*;
}
