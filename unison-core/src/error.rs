use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntryId, RoomId, UserId};

/// The broad category of a [RoomError], used to map errors onto transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Permission,
    NotFound,
    Connection,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoomError {
    #[error("Invalid media reference: {0}")]
    InvalidMediaRef(String),
    #[error("Skip threshold must be between 0 and 1, got {0}")]
    InvalidSkipThreshold(f64),
    #[error("Seek position must be a non-negative number, got {0}")]
    InvalidSeekPosition(f64),
    #[error("Seek requires a position")]
    MissingSeekPosition,
    #[error("Duration of {0} seconds is outside the allowed range")]
    DurationOutOfRange(f64),
    #[error("The queue is full")]
    QueueFull,
    #[error("User has reached the maximum number of queued entries")]
    SubmissionLimitReached,
    #[error("This media is already in the queue")]
    DuplicateEntry,
    #[error("This media is not allowed in this room")]
    MediaBanned,
    #[error("This media was played recently, wait before adding it again")]
    RecentlyPlayed,

    #[error("User {0} is not a participant of this room")]
    NotParticipant(UserId),
    #[error("Not allowed to {0}")]
    Forbidden(&'static str),
    #[error("The entry that is currently playing cannot be removed")]
    CurrentEntryRemoval,
    #[error("The room is full")]
    RoomFull,

    #[error("Queue entry {0} does not exist")]
    EntryNotFound(EntryId),
    #[error("Room {0} does not exist")]
    RoomNotFound(RoomId),
    #[error("Nothing is playing")]
    NothingPlaying,

    #[error("Room {0} is unavailable")]
    RoomUnavailable(RoomId),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        use RoomError::*;

        match self {
            InvalidMediaRef(_)
            | InvalidSkipThreshold(_)
            | InvalidSeekPosition(_)
            | MissingSeekPosition
            | DurationOutOfRange(_)
            | QueueFull
            | SubmissionLimitReached
            | DuplicateEntry
            | MediaBanned
            | RecentlyPlayed => ErrorKind::Validation,
            NotParticipant(_) | Forbidden(_) | CurrentEntryRemoval | RoomFull => {
                ErrorKind::Permission
            }
            EntryNotFound(_) | RoomNotFound(_) | NothingPlaying => ErrorKind::NotFound,
            RoomUnavailable(_) => ErrorKind::Connection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(RoomError::QueueFull.kind(), ErrorKind::Validation);
        assert_eq!(RoomError::Forbidden("seek").kind(), ErrorKind::Permission);
        assert_eq!(RoomError::EntryNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(RoomError::RoomUnavailable(1).kind(), ErrorKind::Connection);
        assert_eq!(
            RoomError::Forbidden("seek").to_string(),
            "Not allowed to seek"
        );
    }
}
