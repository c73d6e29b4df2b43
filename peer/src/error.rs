//! Errors surfaced by lobby and socket setup

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    /// The lobby service could not be reached. Worth retrying.
    #[error("No connection to the lobby service")]
    NoConnection,
    #[error("Lobby is full")]
    LobbyFull,
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("Operation not supported by this transport")]
    Unsupported,
}

impl NetError {
    /// Only connectivity failures are transient; everything else is final
    /// for the attempt that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetError::NoConnection)
    }
}
