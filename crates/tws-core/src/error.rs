use thiserror::Error;

/// Errors produced by the workspace host and its protocol layer.
#[derive(Debug, Error)]
pub enum TwsError {
    #[error("no directory opened")]
    NoWorkspace,

    #[error("invalid path: {0}")]
    PathEscape(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn terminal: {0}")]
    Spawn(String),

    #[error("session is no longer running: {0}")]
    SessionDead(String),

    #[error("terminal already exists: {0}")]
    DuplicateSession(String),

    #[error("session discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl From<ciborium::de::Error<std::io::Error>> for TwsError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        TwsError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for TwsError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        TwsError::Codec(e.to_string())
    }
}

pub type TwsResult<T> = Result<T, TwsError>;
