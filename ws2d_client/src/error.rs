//! Client error types.

use thiserror::Error;
use ws2d_shared::packet::EncodingError;

/// Transport-level failure. Always ends the attempt it happened on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("transport: {0}")]
    Transport(String),
}

/// Errors surfaced to callers of the client API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no open connection")]
    NotConnected,
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
