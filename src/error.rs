use chatcore::ValidationError;
use chatcore::types::ConnectionState;
use thiserror::Error;

pub use crate::snapshot::FetchError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection is {0}, not open")]
    NotOpen(ConnectionState),
    #[error("failed to connect: {0}")]
    Connect(#[source] anyhow::Error),
    #[error("failed to send frame: {0}")]
    Send(#[source] anyhow::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection closed unexpectedly")]
    Closed,
}

/// Everything a [`Session`](crate::session::Session) call can fail with.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("session is closed")]
    Closed,
}
