//! Surface transports: stdio (one surface) and WebSocket (many).
//!
//! Both hand frames to the host through [`serve_surface`], which pumps one
//! [`SurfaceChannel`] until either side goes away.

pub mod stdio;
pub mod websocket;

use crate::host::{Inbound, SurfaceId};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tws_core::{SurfaceChannel, TwsError, TwsResult};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_surface_id() -> SurfaceId {
    NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Register `channel` with the host and shuttle frames both ways.
///
/// Returns when the surface closes, the channel fails, or the host stops.
/// Undecodable frames are logged and skipped.
pub async fn serve_surface<C: SurfaceChannel>(
    surface: SurfaceId,
    mut channel: C,
    inbound: mpsc::Sender<Inbound>,
) -> TwsResult<()> {
    let (outbox_tx, mut outbox) = mpsc::unbounded_channel();
    inbound
        .send(Inbound::Connected {
            surface,
            outbox: outbox_tx,
        })
        .await
        .map_err(|_| TwsError::Transport("host is not running".into()))?;

    let result = loop {
        tokio::select! {
            frame = outbox.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = channel.send(&frame).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
            received = channel.recv() => match received {
                Ok(Some(frame)) => {
                    if inbound.send(Inbound::Frame { surface, frame }).await.is_err() {
                        break Ok(());
                    }
                }
                Ok(None) => {
                    debug!(surface, "surface closed the channel");
                    break Ok(());
                }
                Err(TwsError::Codec(e)) => {
                    warn!(surface, error = %e, "dropping undecodable frame");
                }
                Err(e) => break Err(e),
            },
        }
    };

    let _ = inbound.send(Inbound::Disconnected { surface }).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tws_core::{Frame, Request};

    /// Yields scripted frames, records sent ones.
    struct ScriptedChannel {
        incoming: Vec<TwsResult<Option<Frame>>>,
        sent: mpsc::UnboundedSender<Frame>,
    }

    impl SurfaceChannel for ScriptedChannel {
        async fn send(&mut self, frame: &Frame) -> TwsResult<()> {
            let _ = self.sent.send(frame.clone());
            Ok(())
        }

        async fn recv(&mut self) -> TwsResult<Option<Frame>> {
            if self.incoming.is_empty() {
                return Ok(None);
            }
            self.incoming.remove(0)
        }
    }

    #[tokio::test]
    async fn registers_forwards_and_disconnects() {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (sent_tx, _sent_rx) = mpsc::unbounded_channel();
        let request = Frame::Request {
            id: 7,
            request: Request::GetCurrentDirectory,
        };
        let channel = ScriptedChannel {
            incoming: vec![
                Err(TwsError::Codec("garbage".into())),
                Ok(Some(request.clone())),
            ],
            sent: sent_tx,
        };

        serve_surface(42, channel, inbound_tx).await.unwrap();

        assert!(matches!(
            inbound_rx.recv().await,
            Some(Inbound::Connected { surface: 42, .. })
        ));
        match inbound_rx.recv().await {
            Some(Inbound::Frame { surface, frame }) => {
                assert_eq!(surface, 42);
                assert_eq!(frame, request);
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(matches!(
            inbound_rx.recv().await,
            Some(Inbound::Disconnected { surface: 42 })
        ));
    }

    #[test]
    fn surface_ids_are_unique() {
        let a = next_surface_id();
        let b = next_surface_id();
        assert_ne!(a, b);
    }
}
