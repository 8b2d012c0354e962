//! Test support: scripted peers the client can connect to.
//!
//! - [`ScriptedServer`] accepts WebSocket connections and lets the test push
//!   and read binary frames by hand.
//! - [`BlackHole`] accepts TCP connections but never answers the WebSocket
//!   handshake, so the client's attempt stays pending until its watchdog
//!   fires.

use std::net::SocketAddr;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::debug;

/// Initialises test logging once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// WebSocket listener driven by the test.
pub struct ScriptedServer {
    listener: TcpListener,
}

impl ScriptedServer {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("tcp bind")?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts one client and completes the handshake.
    pub async fn accept(&self) -> anyhow::Result<ServerConn> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        let ws = accept_async(stream).await.context("ws handshake")?;
        debug!(%addr, "Scripted server accepted client");
        Ok(ServerConn { ws })
    }
}

/// Server side of one WebSocket connection.
pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    pub async fn send(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        self.ws
            .send(Message::Binary(frame.to_vec()))
            .await
            .context("ws send")
    }

    /// Next binary frame from the client; `None` once it closed.
    pub async fn recv(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        while let Some(msg) = self.ws.next().await {
            match msg.context("ws recv")? {
                Message::Binary(data) => return Ok(Some(data)),
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await.context("ws close")
    }
}

/// TCP listener that swallows connections without ever speaking.
pub struct BlackHole {
    addr: SocketAddr,
    accepted: mpsc::UnboundedReceiver<SocketAddr>,
    task: JoinHandle<()>,
}

impl BlackHole {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("tcp bind")?;
        let addr = listener.local_addr()?;
        let (tx, accepted) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, peer)) = listener.accept().await {
                held.push(stream);
                if tx.send(peer).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            addr,
            accepted,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of connections swallowed so far.
    pub fn drain_accepted(&mut self) -> usize {
        let mut n = 0;
        while self.accepted.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

impl Drop for BlackHole {
    fn drop(&mut self) {
        self.task.abort();
    }
}
