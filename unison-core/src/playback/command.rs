use serde::{Deserialize, Serialize};

use crate::{EntryId, MediaRef, PlaybackStatus, RoomId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackAction {
    Play,
    Pause,
    Seek,
    Stop,
}

/// A transport command, to be executed by every client at the same instant.
///
/// Besides the action, a command carries the entry and the status the room is
/// in once it applies, so a client that missed earlier commands still ends up
/// in the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCommand {
    pub room_id: RoomId,
    /// Fencing token, strictly increasing per room
    pub seq: u64,
    pub action: PlaybackAction,
    /// The room's status once the command applies
    pub status: PlaybackStatus,
    pub entry_id: Option<EntryId>,
    pub media_ref: Option<MediaRef>,
    pub title: Option<String>,
    /// Where the media should be when the command applies
    pub seek_position_seconds: Option<f64>,
    pub scheduled_execution_timestamp: Timestamp,
    pub issued_at: Timestamp,
}

/// When a transition was issued, and when clients should apply it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub issued_at: Timestamp,
    pub scheduled_at: Timestamp,
}
