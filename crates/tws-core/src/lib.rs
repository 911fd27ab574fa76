//! tws-core: shared protocol library for the tmux workspace shell.
//!
//! Provides the surface/host message types, the CBOR codec with
//! length-prefixed framing, the error taxonomy, and the abstract
//! surface channel trait.

pub mod codec;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{cbor_decode, cbor_encode, frame_encode, FrameDecoder, MAX_FRAME_SIZE};
pub use error::{TwsError, TwsResult};
pub use messages::{
    Event, Failure, FileEntry, Frame, Notify, Reply, Request, Response, TerminalOptions,
    TmuxSessionInfo, TmuxWindowInfo,
};
pub use transport::SurfaceChannel;
