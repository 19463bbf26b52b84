use serde::{Deserialize, Serialize};

use crate::{
    ConnectionState, EntryId, Participant, PlayHistoryEntry, PlaybackCommand, QueueEntry, Role,
    UserId, VoteTally,
};

/// Why the current entry changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvanceReason {
    /// Someone asked for the next entry
    PlayNext,
    /// Someone with authority skipped the entry
    Skipped,
    /// Enough participants voted to skip
    SkipThreshold,
    /// Playback was stopped
    Stopped,
}

impl AdvanceReason {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped | Self::SkipThreshold)
    }
}

/// Describes the events that can be emitted by a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RoomEvent {
    /// A user became a participant of the room.
    ParticipantJoined { participant: Participant },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    PresenceChanged {
        user_id: UserId,
        state: ConnectionState,
    },
    #[serde(rename_all = "camelCase")]
    RoleChanged { user_id: UserId, role: Role },
    /// Leadership moved, `None` means nobody leads the room.
    LeaderChanged { leader: Option<UserId> },
    EntryAdded { entry: QueueEntry },
    #[serde(rename_all = "camelCase")]
    EntryRemoved { entry_id: EntryId },
    VotesUpdated { tally: VoteTally },
    /// An entry stopped being current and was recorded in the history.
    EntryFinished { record: PlayHistoryEntry },
    /// The current entry changed, `None` means the room stopped.
    NowPlaying {
        entry: Option<QueueEntry>,
        reason: AdvanceReason,
    },
    /// A transition was accepted and every client should apply it.
    CommandIssued { command: PlaybackCommand },
}
