//! Terminal sessions: PTY processes and the registry that names them.

pub mod pty;
pub mod registry;
pub mod utf8;

pub use pty::{PtySession, SpawnPolicy, SpawnSpec};
pub use registry::{RegistryEvent, SessionRegistry};
