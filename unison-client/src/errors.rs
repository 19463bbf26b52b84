use thiserror::Error;
use unison_collab::CollabError;
use unison_core::{ErrorKind, ErrorPayload};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection to the room could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Disconnected from the room")]
    Disconnected,
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
    /// The room refused an operation
    #[error("{}", .0.message)]
    Rejected(ErrorPayload),
    #[error("Gave up reconnecting after {0} attempts")]
    GaveUp(u32),
}

impl ClientError {
    /// Whether reconnecting might help
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Disconnected | Self::WebSocket(_) => true,
            Self::Rejected(payload) => payload.kind == ErrorKind::Connection,
            Self::InvalidMessage(_) | Self::GaveUp(_) => false,
        }
    }
}

impl From<CollabError> for ClientError {
    fn from(error: CollabError) -> Self {
        match error {
            CollabError::Room(e) => Self::Rejected((&e).into()),
            CollabError::Database(e) => Self::Connection(e.to_string()),
        }
    }
}
