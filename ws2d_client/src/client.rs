//! Client implementation.
//!
//! The client owns a single [`ClientContext`] (connection manager + session,
//! world) and drives it from one task:
//! - transport attempts and watchdog timers run as spawned tasks that only
//!   post [`ConnectionEvent`]s into one queue
//! - the driver pops events, runs them through the state machine and
//!   executes the resulting [`Command`]s
//! - frames are rendered from the same `select!` loop, so rendering and
//!   dispatch never overlap and need no locking

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use ws2d_shared::{
    config::{ClientConfig, ConfigError},
    packet::{PacketCodec, PacketType},
    surface::Surface,
    world::World,
};

use crate::{
    connection::{AttemptId, Command, ConnectionEvent, ConnectionManager},
    error::ClientError,
    render::Renderer,
    session::{ConnectionState, Session},
    transport::{run_attempt, Transport},
};

/// Everything the handlers mutate, bundled so it can be owned by one task.
pub struct ClientContext {
    pub manager: ConnectionManager,
    pub world: World,
}

impl ClientContext {
    pub fn session(&self) -> &Session {
        self.manager.session()
    }
}

/// High-level game client.
pub struct GameClient {
    pub ctx: ClientContext,
    transport: Arc<dyn Transport>,
    renderer: Renderer,
    frame_interval: Duration,
    frames_rendered: u64,

    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    /// Outbound queues of live attempts. Dropping one tears its attempt down.
    links: HashMap<AttemptId, mpsc::UnboundedSender<Bytes>>,
}

impl GameClient {
    /// Builds a client with the default packet registry.
    pub fn new(cfg: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        Self::with_codec(cfg, transport, PacketCodec::default())
    }

    pub fn with_codec(
        cfg: &ClientConfig,
        transport: Arc<dyn Transport>,
        codec: PacketCodec,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let manager = ConnectionManager::new(cfg.candidates()?, codec, cfg.connect_timeout());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            ctx: ClientContext {
                manager,
                world: World::with_test_entity(),
            },
            transport,
            renderer: Renderer::default(),
            frame_interval: cfg.frame_interval(),
            frames_rendered: 0,
            events_tx,
            events_rx,
            links: HashMap::new(),
        })
    }

    pub fn session(&self) -> &Session {
        self.ctx.session()
    }

    pub fn state(&self) -> ConnectionState {
        self.session().state()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Begins connecting to the first candidate.
    pub fn start(&mut self) {
        let cmds = self.ctx.manager.start(Instant::now());
        self.execute(cmds);
    }

    /// Runs one event through the state machine.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        let cmds = self.ctx.manager.handle(event, Instant::now());
        self.execute(cmds);
    }

    /// Waits for the next transport/timer event.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.recv().await
    }

    /// Handles events until `done` holds or `limit` elapses.
    ///
    /// Returns whether the condition was reached.
    pub async fn pump_until<F>(&mut self, limit: Duration, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + limit;
        while !done(self) {
            match time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) | Err(_) => return false,
            }
        }
        true
    }

    /// Sends a packet stamped with the current identity.
    pub fn send_packet(&mut self, kind: PacketType, payload: &[u8]) -> Result<(), ClientError> {
        let cmds = self.ctx.manager.send_packet(kind, payload)?;
        self.execute(cmds);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.handle_event(ConnectionEvent::DisconnectRequested);
    }

    /// Draws one frame of the world.
    pub fn render(&mut self, surface: &mut dyn Surface) {
        self.renderer.render_frame(surface, &self.ctx.world);
        self.frames_rendered += 1;
    }

    fn execute(&mut self, cmds: Vec<Command>) {
        for cmd in cmds {
            match cmd {
                Command::Connect { attempt, candidate } => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    self.links.insert(attempt, tx);
                    tokio::spawn(run_attempt(
                        Arc::clone(&self.transport),
                        attempt,
                        candidate,
                        self.events_tx.clone(),
                        rx,
                    ));
                }
                Command::ArmWatchdog { attempt, after } => {
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        time::sleep(after).await;
                        let _ = events.send(ConnectionEvent::WatchdogFired(attempt));
                    });
                }
                Command::Close { attempt } => {
                    if self.links.remove(&attempt).is_some() {
                        debug!(attempt = attempt.0, "Tearing down attempt");
                    }
                }
                Command::Send { attempt, frame } => match self.links.get(&attempt) {
                    Some(tx) => {
                        if tx.send(frame).is_err() {
                            debug!(attempt = attempt.0, "Link already gone, frame dropped");
                        }
                    }
                    None => warn!(attempt = attempt.0, "No link for outbound frame"),
                },
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            return Vec::new();
        };

        match cmd {
            "status" => {
                let session = self.session();
                let mut out = vec![
                    format!("State: {:?}", session.state()),
                    format!(
                        "Identity: {}",
                        session
                            .identity()
                            .map_or_else(|| "unassigned".to_string(), |u| u.to_string())
                    ),
                ];
                if let Some(server) = self.ctx.manager.current_candidate() {
                    out.push(format!("Server: {}", server));
                }
                out.push(format!("Failovers: {}", self.ctx.manager.failovers()));
                out.push(format!("Frames: {}", self.frames_rendered));
                out
            }
            "disconnect" => {
                self.disconnect();
                vec!["Disconnected".to_string()]
            }
            "connect" => {
                self.start();
                vec!["Connecting".to_string()]
            }
            other => vec![format!("Unknown command: {}", other)],
        }
    }

    /// Main loop: network events, frames and console lines on one task.
    ///
    /// Returns when the console sends `quit`/`exit`. A closed console just
    /// stops being polled.
    pub async fn run(
        &mut self,
        surface: &mut dyn Surface,
        mut console: mpsc::Receiver<String>,
    ) -> anyhow::Result<()> {
        let mut frames = time::interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut console_open = true;

        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = frames.tick() => self.render(surface),
                line = console.recv(), if console_open => {
                    let Some(line) = line else {
                        debug!("Console closed");
                        console_open = false;
                        continue;
                    };
                    if matches!(line.trim(), "quit" | "exit") {
                        break;
                    }
                    for out in self.exec_console(&line) {
                        println!("{}", out);
                    }
                }
            }
        }

        info!("Shutting down client");
        self.disconnect();
        Ok(())
    }
}
