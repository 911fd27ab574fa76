//! Abstract surface channel.
//!
//! The host does not care how frames reach a surface; stdio pipes and
//! WebSocket connections both implement this trait.

use crate::error::TwsResult;
use crate::messages::Frame;

/// An ordered, bidirectional channel of [`Frame`]s to one surface.
#[allow(async_fn_in_trait)]
pub trait SurfaceChannel: Send {
    /// Send one frame.
    async fn send(&mut self, frame: &Frame) -> TwsResult<()>;

    /// Receive the next frame. `Ok(None)` means the surface went away.
    async fn recv(&mut self) -> TwsResult<Option<Frame>>;
}
