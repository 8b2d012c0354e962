//! Connection manager.
//!
//! A sans-I/O state machine: it consumes [`ConnectionEvent`]s and answers
//! with [`Command`]s for the driver to execute. It never touches sockets or
//! timers itself, which keeps failover deterministic and testable.
//!
//! ```text
//! Idle --start--> Connecting(0) --Opened--> Open --Closed--> Closed
//!                      |  ^
//!       watchdog fired |  | Close(stale) + Connect(i+1 mod N)
//!                      +--+
//! ```
//!
//! Every attempt gets a fresh [`AttemptId`]; events tagged with a stale id
//! are dropped, so a transport that was given up on is never reused.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use ws2d_shared::{
    config::{ServerCandidate, ServerList},
    packet::{Packet, PacketCodec, PacketType, Uid},
};

use crate::{
    error::{ClientError, ConnectionError},
    session::{ConnectionState, Session},
};

/// Identifies one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

/// Inputs to the state machine.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Transport for the attempt is established.
    Opened(AttemptId),
    /// One inbound binary frame.
    Message(AttemptId, Bytes),
    /// Transport ended. `None` means a clean close.
    Closed(AttemptId, Option<ConnectionError>),
    /// The connect watchdog for the attempt expired.
    WatchdogFired(AttemptId),
    /// Local request to drop the connection.
    DisconnectRequested,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        attempt: AttemptId,
        candidate: ServerCandidate,
    },
    ArmWatchdog {
        attempt: AttemptId,
        after: Duration,
    },
    /// Tear down the attempt's transport, whatever state it is in.
    Close { attempt: AttemptId },
    Send { attempt: AttemptId, frame: Bytes },
}

/// A pending or established attempt against one candidate.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub id: AttemptId,
    pub candidate_index: usize,
    pub started_at: Instant,
    transport_alive: bool,
}

pub struct ConnectionManager {
    servers: ServerList,
    codec: PacketCodec,
    connect_timeout: Duration,
    session: Session,
    attempt: Option<ConnectionAttempt>,
    next_attempt: u64,
    failovers: u64,
}

impl ConnectionManager {
    pub fn new(servers: ServerList, codec: PacketCodec, connect_timeout: Duration) -> Self {
        Self {
            servers,
            codec,
            connect_timeout,
            session: Session::new(),
            attempt: None,
            next_attempt: 0,
            failovers: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn attempt(&self) -> Option<&ConnectionAttempt> {
        self.attempt.as_ref()
    }

    pub fn current_candidate(&self) -> Option<&ServerCandidate> {
        self.attempt
            .as_ref()
            .map(|a| self.servers.get(a.candidate_index))
    }

    pub fn servers(&self) -> &ServerList {
        &self.servers
    }

    pub fn codec(&self) -> &PacketCodec {
        &self.codec
    }

    /// Number of watchdog-driven failovers so far.
    pub fn failovers(&self) -> u64 {
        self.failovers
    }

    /// Starts connecting from the first candidate.
    ///
    /// Also usable by a supervisor to restart after the connection closed;
    /// any attempt still in flight is closed first.
    pub fn start(&mut self, now: Instant) -> Vec<Command> {
        let mut cmds = Vec::new();
        if let Some(old) = self.attempt.take() {
            cmds.push(Command::Close { attempt: old.id });
        }
        self.begin_attempt(0, now, &mut cmds);
        cmds
    }

    fn begin_attempt(&mut self, candidate_index: usize, now: Instant, cmds: &mut Vec<Command>) {
        let id = AttemptId(self.next_attempt);
        self.next_attempt += 1;

        let candidate = self.servers.get(candidate_index).clone();
        info!(attempt = id.0, server = %candidate, "Connecting to server");

        self.session.reset();
        self.attempt = Some(ConnectionAttempt {
            id,
            candidate_index,
            started_at: now,
            transport_alive: true,
        });
        cmds.push(Command::Connect {
            attempt: id,
            candidate,
        });
        cmds.push(Command::ArmWatchdog {
            attempt: id,
            after: self.connect_timeout,
        });
    }

    fn is_current(&self, id: AttemptId) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.id == id)
    }

    /// Feeds one event through the state machine.
    pub fn handle(&mut self, event: ConnectionEvent, now: Instant) -> Vec<Command> {
        let mut cmds = Vec::new();
        match event {
            ConnectionEvent::Opened(id) => {
                if !self.is_current(id) {
                    debug!(attempt = id.0, "Ignoring open of stale attempt");
                    cmds.push(Command::Close { attempt: id });
                    return cmds;
                }
                self.session.set_state(ConnectionState::Open);
                if let Some(server) = self.current_candidate() {
                    info!(attempt = id.0, server = %server, "Connected to server");
                }
            }
            ConnectionEvent::Message(id, frame) => {
                if !self.is_current(id) || !self.session.is_open() {
                    debug!(attempt = id.0, "Dropping frame from inactive attempt");
                    return cmds;
                }
                self.on_frame(id, &frame, &mut cmds);
            }
            ConnectionEvent::Closed(id, error) => {
                let Some(attempt) = self.attempt.as_mut().filter(|a| a.id == id) else {
                    return cmds;
                };
                attempt.transport_alive = false;
                match (self.session.state(), error) {
                    (ConnectionState::Open, None) => {
                        info!(attempt = id.0, "Disconnected");
                    }
                    (ConnectionState::Open, Some(e)) => {
                        warn!(attempt = id.0, error = %e, "Disconnected");
                    }
                    (_, e) => {
                        // The watchdog decides when to move on.
                        let reason = e.map(|e| e.to_string()).unwrap_or_default();
                        warn!(attempt = id.0, error = %reason, "Connection attempt failed before opening");
                        return cmds;
                    }
                }
                self.session.set_state(ConnectionState::Closed);
            }
            ConnectionEvent::WatchdogFired(id) => {
                let Some(attempt) = self.attempt.as_ref().filter(|a| a.id == id) else {
                    return cmds;
                };
                // Anything but Open at fire time counts as a failed attempt,
                // including a transport that opened and already died.
                if self.session.is_open() {
                    return cmds;
                }
                let next = self.servers.next_index(attempt.candidate_index);
                warn!(
                    attempt = id.0,
                    server = %self.servers.get(attempt.candidate_index),
                    waited_ms = now.duration_since(attempt.started_at).as_millis() as u64,
                    "Connection attempt timed out, failing over"
                );
                cmds.push(Command::Close { attempt: id });
                self.failovers += 1;
                self.begin_attempt(next, now, &mut cmds);
            }
            ConnectionEvent::DisconnectRequested => {
                if let Some(attempt) = self.attempt.take() {
                    info!(attempt = attempt.id.0, "Disconnect requested");
                    cmds.push(Command::Close { attempt: attempt.id });
                }
                self.session.set_state(ConnectionState::Closed);
            }
        }
        cmds
    }

    fn on_frame(&mut self, id: AttemptId, frame: &[u8], cmds: &mut Vec<Command>) {
        let packet = match self.codec.decode(frame) {
            Ok(p) => p,
            Err(e) => {
                warn!(attempt = id.0, error = %e, len = frame.len(), "Dropping malformed packet");
                return;
            }
        };
        self.dispatch(id, packet, cmds);
    }

    fn dispatch(&mut self, id: AttemptId, packet: Packet, cmds: &mut Vec<Command>) {
        match packet.kind {
            PacketType::Heartbeat => {
                let identity = Uid::to_wire(self.session.identity());
                match self.codec.encode(PacketType::Heartbeat, identity, &[]) {
                    Ok(frame) => cmds.push(Command::Send { attempt: id, frame }),
                    Err(e) => warn!(error = %e, "Failed to encode heartbeat reply"),
                }
            }
            PacketType::UidAssign => {
                if let Some(uid) = packet.assigned_uid() {
                    if let Some(previous) = self.session.identity().filter(|p| *p != uid) {
                        debug!(%previous, "Identity reassigned");
                    }
                    info!(uid = %uid, "Identity assigned");
                    self.session.set_identity(uid);
                }
            }
            PacketType::Custom(tag) => {
                debug!(tag, identity = packet.identity, "Unhandled packet type");
            }
        }
    }

    /// Builds an outbound packet stamped with the session identity.
    pub fn send_packet(
        &self,
        kind: PacketType,
        payload: &[u8],
    ) -> Result<Vec<Command>, ClientError> {
        let attempt = match &self.attempt {
            Some(a) if self.session.is_open() && a.transport_alive => a.id,
            _ => return Err(ClientError::NotConnected),
        };
        let identity = Uid::to_wire(self.session.identity());
        let frame = self.codec.encode(kind, identity, payload).map_err(|e| {
            error!(error = %e, ?kind, "Refusing to send packet");
            e
        })?;
        Ok(vec![Command::Send { attempt, frame }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws2d_shared::packet::{encode, UNASSIGNED_UID};

    fn manager(hosts: &[&str]) -> ConnectionManager {
        let servers = ServerList::new(
            hosts
                .iter()
                .map(|h| ServerCandidate::new(*h, 3272))
                .collect(),
        )
        .unwrap();
        ConnectionManager::new(
            servers,
            PacketCodec::default(),
            Duration::from_millis(1500),
        )
    }

    fn connect_target(cmds: &[Command]) -> Option<(AttemptId, String)> {
        cmds.iter().find_map(|c| match c {
            Command::Connect { attempt, candidate } => Some((*attempt, candidate.host.clone())),
            _ => None,
        })
    }

    fn sent_frames(cmds: &[Command]) -> Vec<Bytes> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Send { frame, .. } => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    fn open(mgr: &mut ConnectionManager) -> AttemptId {
        let now = Instant::now();
        let (id, _) = connect_target(&mgr.start(now)).unwrap();
        mgr.handle(ConnectionEvent::Opened(id), now);
        id
    }

    #[test]
    fn start_connects_to_first_candidate_with_watchdog() {
        let mut mgr = manager(&["a", "b"]);
        let cmds = mgr.start(Instant::now());
        assert_eq!(
            cmds,
            vec![
                Command::Connect {
                    attempt: AttemptId(0),
                    candidate: ServerCandidate::new("a", 3272),
                },
                Command::ArmWatchdog {
                    attempt: AttemptId(0),
                    after: Duration::from_millis(1500),
                },
            ]
        );
        assert_eq!(mgr.session().state(), ConnectionState::Connecting);
        assert_eq!(mgr.session().identity(), None);
    }

    #[test]
    fn watchdog_fails_over_and_wraps() {
        let mut mgr = manager(&["a", "b"]);
        let t0 = Instant::now();
        let (first, host) = connect_target(&mgr.start(t0)).unwrap();
        assert_eq!(host, "a");

        let t1 = t0 + Duration::from_millis(1500);
        let cmds = mgr.handle(ConnectionEvent::WatchdogFired(first), t1);
        assert_eq!(cmds[0], Command::Close { attempt: first });
        let (second, host) = connect_target(&cmds).unwrap();
        assert_eq!(host, "b");
        assert_ne!(second, first);

        let t2 = t1 + Duration::from_millis(1500);
        let cmds = mgr.handle(ConnectionEvent::WatchdogFired(second), t2);
        let (third, host) = connect_target(&cmds).unwrap();
        assert_eq!(host, "a");
        assert_eq!(mgr.attempt().unwrap().candidate_index, 0);
        assert!(third > second);
        assert_eq!(mgr.failovers(), 2);
    }

    #[test]
    fn stale_attempt_events_are_ignored() {
        let mut mgr = manager(&["a", "b"]);
        let now = Instant::now();
        let (first, _) = connect_target(&mgr.start(now)).unwrap();
        mgr.handle(ConnectionEvent::WatchdogFired(first), now);

        // The abandoned transport finishing its handshake must not be used.
        let cmds = mgr.handle(ConnectionEvent::Opened(first), now);
        assert_eq!(cmds, vec![Command::Close { attempt: first }]);
        assert_eq!(mgr.session().state(), ConnectionState::Connecting);

        assert!(mgr
            .handle(ConnectionEvent::WatchdogFired(first), now)
            .is_empty());
        assert!(mgr
            .handle(ConnectionEvent::Closed(first, None), now)
            .is_empty());
    }

    #[test]
    fn open_attempt_survives_its_watchdog() {
        let mut mgr = manager(&["a", "b"]);
        let id = open(&mut mgr);
        assert_eq!(mgr.session().state(), ConnectionState::Open);

        assert!(mgr
            .handle(ConnectionEvent::WatchdogFired(id), Instant::now())
            .is_empty());
        assert_eq!(mgr.current_candidate().unwrap().host, "a");
        assert_eq!(mgr.failovers(), 0);
    }

    #[test]
    fn failed_attempt_waits_for_watchdog() {
        let mut mgr = manager(&["a", "b"]);
        let now = Instant::now();
        let (id, _) = connect_target(&mgr.start(now)).unwrap();

        let refused = ConnectionError::Connect {
            url: "ws://a:3272".into(),
            reason: "refused".into(),
        };
        assert!(mgr
            .handle(ConnectionEvent::Closed(id, Some(refused)), now)
            .is_empty());
        assert_eq!(mgr.session().state(), ConnectionState::Connecting);

        let cmds = mgr.handle(ConnectionEvent::WatchdogFired(id), now);
        assert_eq!(connect_target(&cmds).unwrap().1, "b");
    }

    #[test]
    fn close_after_open_is_terminal() {
        let mut mgr = manager(&["a"]);
        let id = open(&mut mgr);
        assert!(mgr
            .handle(ConnectionEvent::Closed(id, None), Instant::now())
            .is_empty());
        assert_eq!(mgr.session().state(), ConnectionState::Closed);
        assert!(matches!(
            mgr.send_packet(PacketType::Heartbeat, &[]),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn transport_error_after_open_is_terminal() {
        let mut mgr = manager(&["a"]);
        let id = open(&mut mgr);
        let err = ConnectionError::Transport("connection reset".into());
        assert!(mgr
            .handle(ConnectionEvent::Closed(id, Some(err)), Instant::now())
            .is_empty());
        assert_eq!(mgr.session().state(), ConnectionState::Closed);
        assert!(!mgr.attempt().unwrap().transport_alive);
        assert!(matches!(
            mgr.send_packet(PacketType::Heartbeat, &[]),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn early_close_after_open_still_fails_over() {
        let mut mgr = manager(&["a", "b"]);
        let id = open(&mut mgr);
        let now = Instant::now();
        mgr.handle(ConnectionEvent::Closed(id, None), now);

        let cmds = mgr.handle(ConnectionEvent::WatchdogFired(id), now);
        assert_eq!(connect_target(&cmds).unwrap().1, "b");
        assert_eq!(mgr.session().state(), ConnectionState::Connecting);
    }

    #[test]
    fn heartbeat_is_echoed_once_with_identity() {
        let mut mgr = manager(&["a"]);
        let id = open(&mut mgr);
        let now = Instant::now();

        let cmds = mgr.handle(
            ConnectionEvent::Message(id, encode(PacketType::Heartbeat, 0, &[]).unwrap()),
            now,
        );
        assert_eq!(sent_frames(&cmds), vec![Bytes::from_static(&[0, UNASSIGNED_UID])]);

        mgr.handle(
            ConnectionEvent::Message(id, encode(PacketType::UidAssign, 0, &[12]).unwrap()),
            now,
        );
        let cmds = mgr.handle(
            ConnectionEvent::Message(id, encode(PacketType::Heartbeat, 0, &[]).unwrap()),
            now,
        );
        assert_eq!(sent_frames(&cmds), vec![Bytes::from_static(&[0, 12])]);
    }

    #[test]
    fn uid_assign_overwrites() {
        let mut mgr = manager(&["a"]);
        let id = open(&mut mgr);
        let now = Instant::now();

        for uid in [4u8, 9] {
            let cmds = mgr.handle(
                ConnectionEvent::Message(id, encode(PacketType::UidAssign, 0, &[uid]).unwrap()),
                now,
            );
            assert!(cmds.is_empty());
        }
        assert_eq!(mgr.session().identity(), Some(Uid(9)));

        // Two-byte form carries the uid in the identity byte.
        mgr.handle(ConnectionEvent::Message(id, Bytes::from_static(&[1, 3])), now);
        assert_eq!(mgr.session().identity(), Some(Uid(3)));
    }

    #[test]
    fn malformed_and_unknown_frames_are_dropped() {
        let mut mgr = manager(&["a"]);
        let id = open(&mut mgr);
        let now = Instant::now();

        for frame in [&[][..], &[0][..], &[77, 1, 2][..]] {
            let cmds = mgr.handle(
                ConnectionEvent::Message(id, Bytes::copy_from_slice(frame)),
                now,
            );
            assert!(cmds.is_empty());
        }
        assert_eq!(mgr.session().state(), ConnectionState::Open);
        assert_eq!(mgr.session().identity(), None);
    }

    #[test]
    fn custom_packets_are_ignored_by_dispatch() {
        let mut registry = ws2d_shared::packet::PacketRegistry::default();
        let chat = registry.register("chat", 5, 1).unwrap();
        let codec = PacketCodec::new(registry);
        let frame = codec.encode(chat, 0, &[1]).unwrap();

        let servers = ServerList::new(vec![ServerCandidate::new("a", 1)]).unwrap();
        let mut mgr = ConnectionManager::new(servers, codec, Duration::from_millis(10));
        let id = open(&mut mgr);

        assert!(mgr
            .handle(ConnectionEvent::Message(id, frame), Instant::now())
            .is_empty());
        let cmds = mgr.send_packet(chat, &[42]).unwrap();
        assert_eq!(sent_frames(&cmds), vec![Bytes::from_static(&[5, UNASSIGNED_UID, 42])]);
    }

    #[test]
    fn send_requires_open_connection() {
        let mut mgr = manager(&["a"]);
        assert!(matches!(
            mgr.send_packet(PacketType::Heartbeat, &[]),
            Err(ClientError::NotConnected)
        ));

        mgr.start(Instant::now());
        assert!(matches!(
            mgr.send_packet(PacketType::Heartbeat, &[]),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn send_rejects_contract_mismatch() {
        let mut mgr = manager(&["a"]);
        open(&mut mgr);
        assert!(matches!(
            mgr.send_packet(PacketType::Heartbeat, &[1, 2]),
            Err(ClientError::Encoding(_))
        ));
    }

    #[test]
    fn disconnect_closes_without_failover() {
        let mut mgr = manager(&["a", "b"]);
        let id = open(&mut mgr);
        let now = Instant::now();

        let cmds = mgr.handle(ConnectionEvent::DisconnectRequested, now);
        assert_eq!(cmds, vec![Command::Close { attempt: id }]);
        assert_eq!(mgr.session().state(), ConnectionState::Closed);
        assert!(mgr.attempt().is_none());
        assert!(mgr
            .handle(ConnectionEvent::WatchdogFired(id), now)
            .is_empty());
    }

    #[test]
    fn restart_after_close_begins_at_first_candidate() {
        let mut mgr = manager(&["a", "b"]);
        let now = Instant::now();
        let (first, _) = connect_target(&mgr.start(now)).unwrap();
        mgr.handle(ConnectionEvent::WatchdogFired(first), now);
        mgr.handle(ConnectionEvent::DisconnectRequested, now);

        let cmds = mgr.start(now);
        let (id, host) = connect_target(&cmds).unwrap();
        assert_eq!(host, "a");
        assert_eq!(id, AttemptId(2));
        assert_eq!(mgr.session().state(), ConnectionState::Connecting);
    }
}
