use thiserror::Error;
use unison_core::{ErrorKind, RoomError};

use crate::DatabaseError;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl CollabError {
    /// The client-facing classification, if this error has one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Room(e) => Some(e.kind()),
            Self::Database(DatabaseError::NotFound { .. }) => Some(ErrorKind::NotFound),
            Self::Database(_) => None,
        }
    }
}
