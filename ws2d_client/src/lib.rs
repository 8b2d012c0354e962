//! `ws2d_client`
//!
//! Client-side systems:
//! - Connection management with watchdog-driven failover across servers
//! - Session state (assigned identity, connection status)
//! - Heartbeat echo and identity assignment dispatch
//! - Camera-locked render loop over an abstract drawing surface

pub mod client;
pub mod connection;
pub mod error;
pub mod render;
pub mod session;
pub mod transport;

pub use client::GameClient;
