//! Transport layer.
//!
//! A [`Transport`] opens one message-oriented [`Link`] to a candidate. Each
//! connection attempt runs in its own task ([`run_attempt`]) that reports
//! back to the driver purely through [`ConnectionEvent`]s, so the state
//! machine stays the single writer of session state.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use ws2d_shared::config::ServerCandidate;

use crate::{
    connection::{AttemptId, ConnectionEvent},
    error::ConnectionError,
};

/// Opens links to server candidates.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, candidate: &ServerCandidate) -> Result<Box<dyn Link>, ConnectionError>;
}

/// An established, message-oriented connection carrying binary frames.
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, frame: Bytes) -> Result<(), ConnectionError>;

    /// Next inbound frame; `None` once the peer closed. Must be cancel safe.
    async fn recv(&mut self) -> Option<Result<Bytes, ConnectionError>>;

    async fn close(&mut self);
}

/// WebSocket transport in binary frame mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, candidate: &ServerCandidate) -> Result<Box<dyn Link>, ConnectionError> {
        let url = candidate.url();
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ConnectionError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(WsLink { ws }))
    }
}

pub struct WsLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, frame: Bytes) -> Result<(), ConnectionError> {
        self.ws
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Bytes, ConnectionError>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => return Some(Ok(Bytes::from(data))),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(other)) => {
                    trace!(?other, "Ignoring non-binary frame");
                }
                Some(Err(e)) => return Some(Err(ConnectionError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Drives one attempt: open, then pump frames both ways until either side
/// goes away.
///
/// Dropping every sender of `outbound` tears the attempt down, including one
/// still stuck in the handshake.
pub(crate) async fn run_attempt(
    transport: Arc<dyn Transport>,
    attempt: AttemptId,
    candidate: ServerCandidate,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    let opened = tokio::select! {
        res = transport.open(&candidate) => res,
        _ = wait_closed(&mut outbound) => {
            debug!(attempt = attempt.0, server = %candidate, "Abandoned pending connection");
            return;
        }
    };

    let mut link = match opened {
        Ok(link) => link,
        Err(e) => {
            let _ = events.send(ConnectionEvent::Closed(attempt, Some(e)));
            return;
        }
    };
    if events.send(ConnectionEvent::Opened(attempt)).is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = link.send(frame).await {
                        let _ = events.send(ConnectionEvent::Closed(attempt, Some(e)));
                        return;
                    }
                }
                None => {
                    debug!(attempt = attempt.0, "Closing link");
                    link.close().await;
                    return;
                }
            },
            inbound = link.recv() => match inbound {
                Some(Ok(frame)) => {
                    if events.send(ConnectionEvent::Message(attempt, frame)).is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let _ = events.send(ConnectionEvent::Closed(attempt, Some(e)));
                    return;
                }
                None => {
                    let _ = events.send(ConnectionEvent::Closed(attempt, None));
                    return;
                }
            },
        }
    }
}

async fn wait_closed(rx: &mut mpsc::UnboundedReceiver<Bytes>) {
    while rx.recv().await.is_some() {}
}
