//! WebSocket listener using tokio-tungstenite.
//!
//! Each binary message carries one bare CBOR frame. Any number of surfaces
//! may connect; each gets its own task running [`serve_surface`].

use super::{next_surface_id, serve_surface};
use crate::host::Inbound;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use tws_core::{cbor_decode, cbor_encode, Frame, SurfaceChannel, TwsError, TwsResult, MAX_FRAME_SIZE};

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// Bind and start accepting. Returns the bound address and a receiver of
/// completed handshakes.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> TwsResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| TwsError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener
        .local_addr()
        .map_err(|e| TwsError::Transport(format!("WS bind failed: {e}")))?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}

/// Give every accepted connection its own surface task.
pub async fn accept_loop(
    mut connections: mpsc::Receiver<WebSocketConnection>,
    inbound: mpsc::Sender<Inbound>,
) {
    while let Some(conn) = connections.recv().await {
        let surface = next_surface_id();
        let remote = conn.remote_addr;
        info!(surface, remote = %remote, "WebSocket surface connected");
        let inbound = inbound.clone();
        tokio::spawn(async move {
            match serve_surface(surface, WsChannel::new(conn.ws_stream), inbound).await {
                Ok(()) => debug!(surface, remote = %remote, "WebSocket surface finished"),
                Err(e) => warn!(surface, remote = %remote, error = %e, "WebSocket surface error"),
            }
        });
    }
}

pub struct WsChannel<S> {
    ws: WebSocketStream<S>,
}

impl<S> WsChannel<S> {
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }
}

impl<S> SurfaceChannel for WsChannel<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: &Frame) -> TwsResult<()> {
        let payload = cbor_encode(frame)?;
        self.ws
            .send(Message::Binary(payload.into()))
            .await
            .map_err(|e| TwsError::Transport(format!("WS send failed: {e}")))
    }

    /// Text messages are ignored; pings are answered by tungstenite.
    async fn recv(&mut self) -> TwsResult<Option<Frame>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => {
                    if data.len() > MAX_FRAME_SIZE {
                        return Err(TwsError::InvalidMessage(format!(
                            "WS frame too large: {} bytes (max {MAX_FRAME_SIZE})",
                            data.len()
                        )));
                    }
                    return cbor_decode(&data).map(Some);
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TwsError::Transport(format!("WS recv failed: {e}")));
                }
            }
        }
    }
}
