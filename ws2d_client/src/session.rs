//! Session state.
//!
//! Holds what the server told us about ourselves plus the connection status.
//! Only the connection manager mutates it.

use ws2d_shared::packet::Uid;

/// Status of the current connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// An attempt is pending (or about to be retried by the watchdog).
    Connecting,
    /// Transport established.
    Open,
    /// Transport gone after having been open, or a local disconnect.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity: Option<Uid>,
    state: ConnectionState,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            identity: None,
            state: ConnectionState::Connecting,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<Uid> {
        self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub(crate) fn set_identity(&mut self, uid: Uid) {
        self.identity = Some(uid);
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Forgets the identity and goes back to `Connecting`.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
