// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control channel: WebSocket request/response plus FMDM broadcast.
//!
//! Each accepted connection runs in its own task. The connection loop
//! interleaves client requests with FMDM pushes; messages to one client
//! are delivered in production order, and no ordering is promised across
//! clients. Missed versions are never replayed; a reconnecting client
//! asks for a fresh snapshot.

mod handlers;

pub use handlers::ListenCtx;

use crate::protocol::{self, ControlResponse, PushMessage};
use fmcp_core::ClientId;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Server-side guard per request. Client timeouts do not roll back
/// effects already committed here.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Listener task accepting control-channel connections.
pub struct Listener {
    tcp: TcpListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(tcp: TcpListener, ctx: Arc<ListenCtx>) -> Self {
        Self { tcp, ctx }
    }

    /// Accept loop; runs until the daemon exits.
    pub async fn run(self) {
        loop {
            match self.tcp.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "control client connecting");
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

/// Serve one client: WebSocket handshake, then request/push interleave.
async fn handle_connection(stream: TcpStream, ctx: &ListenCtx) -> Result<(), ConnectionError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    let client_id = ClientId::new();
    // Subscribe before registering so this client observes its own
    // connection bump and everything after it.
    let (mut fmdm_rx, _subscription) = ctx.fmdm.subscribe();
    ctx.fmdm.add_client(client_id);
    info!(%client_id, "control client connected");

    let result = connection_loop(&mut write, &mut read, &mut fmdm_rx, ctx).await;

    ctx.fmdm.remove_client(client_id);
    info!(%client_id, "control client disconnected");
    result
}

async fn connection_loop<W, R>(
    write: &mut W,
    read: &mut R,
    fmdm_rx: &mut tokio::sync::mpsc::UnboundedReceiver<fmcp_core::Fmdm>,
    ctx: &ListenCtx,
) -> Result<(), ConnectionError>
where
    W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = dispatch(&text, ctx).await;
                    let json = serde_json::to_string(&reply)?;
                    write.send(Message::Text(json.into())).await.map_err(ConnectionError::Ws)?;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Binary and control frames carry no protocol meaning
                }
                Some(Err(e)) => {
                    warn!(error = %e, "read error, closing connection");
                    break;
                }
            },

            update = fmdm_rx.recv() => match update {
                Some(fmdm) => {
                    let push = PushMessage::FmdmUpdate { fmdm };
                    let json = serde_json::to_string(&push)?;
                    write.send(Message::Text(json.into())).await.map_err(ConnectionError::Ws)?;
                }
                None => break,
            },
        }
    }
    Ok(())
}

/// Parse and handle one request frame.
///
/// Schema violations get an `error` reply; the client stays connected.
async fn dispatch(text: &str, ctx: &ListenCtx) -> ControlResponse {
    let request = match protocol::parse_request(text) {
        Ok(request) => request,
        Err((id, e)) => {
            return ControlResponse::Error { id: id.unwrap_or_default(), error: e.to_string() }
        }
    };

    debug!(request = ?request, "received request");
    let id = request.id().to_string();
    match tokio::time::timeout(REQUEST_TIMEOUT, handlers::handle_request(request, ctx)).await {
        Ok(response) => response,
        Err(_) => ControlResponse::Error { id, error: "timeout".to_string() },
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
