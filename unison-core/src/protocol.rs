use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    millis_to_seconds, ConnectionState, EntryId, ErrorKind, PlaybackAction, PlaybackCommand,
    PlaybackStatus, QueueEntry, RoomError, RoomEvent, RoomId, Timestamp, UserId, VoteType,
};

/// A pub/sub channel name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    /// Participants, presence and leadership
    RoomState(RoomId),
    /// Entries and votes
    RoomQueue(RoomId),
    RoomNowPlaying(RoomId),
    RoomCommands(RoomId),
    /// Snapshots sent to a single user on request
    UserSyncResponse(UserId),
}

#[derive(Debug, Error, PartialEq)]
#[error("Unknown topic: {0}")]
pub struct UnknownTopic(String);

impl Topic {
    /// The room this topic belongs to, if any
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Self::RoomState(id)
            | Self::RoomQueue(id)
            | Self::RoomNowPlaying(id)
            | Self::RoomCommands(id) => Some(*id),
            Self::UserSyncResponse(_) => None,
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomState(id) => write!(f, "room.{}.state", id),
            Self::RoomQueue(id) => write!(f, "room.{}.queue", id),
            Self::RoomNowPlaying(id) => write!(f, "room.{}.nowPlaying", id),
            Self::RoomCommands(id) => write!(f, "room.{}.commands", id),
            Self::UserSyncResponse(id) => write!(f, "user.{}.syncResponse", id),
        }
    }
}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownTopic(s.to_string());
        let parts: Vec<_> = s.split('.').collect();

        let [scope, id, channel] = parts.as_slice() else {
            return Err(unknown());
        };

        let id = id.parse().map_err(|_| unknown())?;

        match (*scope, *channel) {
            ("room", "state") => Ok(Self::RoomState(id)),
            ("room", "queue") => Ok(Self::RoomQueue(id)),
            ("room", "nowPlaying") => Ok(Self::RoomNowPlaying(id)),
            ("room", "commands") => Ok(Self::RoomCommands(id)),
            ("user", "syncResponse") => Ok(Self::UserSyncResponse(id)),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = UnknownTopic;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.to_string()
    }
}

/// Everything a client needs to line its player up with the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub room_id: RoomId,
    /// The seq of the last command this snapshot already reflects
    pub seq: u64,
    pub status: PlaybackStatus,
    pub current: Option<QueueEntry>,
    pub position_seconds: f64,
    pub anchor: Option<Timestamp>,
    pub effective_at: Option<Timestamp>,
    pub leader: Option<UserId>,
    pub server_time: Timestamp,
}

impl SyncSnapshot {
    /// The instant a client should apply this snapshot, given the current time
    pub fn apply_at(&self, now: Timestamp) -> Timestamp {
        self.effective_at.map_or(now, |at| at.max(now))
    }

    /// The position the media should be at when applied at `at`
    pub fn position_at(&self, at: Timestamp) -> f64 {
        match (self.status, self.anchor) {
            (PlaybackStatus::Playing, Some(anchor)) if !self.effective_at.is_some_and(|e| at < e) => {
                millis_to_seconds(at - anchor).max(0.)
            }
            _ => self.position_seconds,
        }
    }

    /// Whether applying `other` after this one would change anything on a client
    pub fn is_equivalent(&self, other: &SyncSnapshot) -> bool {
        self.room_id == other.room_id
            && self.seq == other.seq
            && self.status == other.status
            && self.current.as_ref().map(|c| c.id) == other.current.as_ref().map(|c| c.id)
            && self.anchor == other.anchor
            && self.position_seconds == other.position_seconds
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    /// The room the failed request was sent to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl ErrorPayload {
    pub fn in_room(self, room_id: RoomId) -> Self {
        Self {
            room_id: Some(room_id),
            ..self
        }
    }
}

impl From<&RoomError> for ErrorPayload {
    fn from(error: &RoomError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            room_id: None,
        }
    }
}

/// The contents of a [Publication]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Payload {
    Event(RoomEvent),
    Command(PlaybackCommand),
    Sync(SyncSnapshot),
    /// The subscriber missed messages and must request a fresh sync
    Resync,
    Error(ErrorPayload),
}

/// A message published on a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub topic: Topic,
    pub payload: Payload,
}

impl Publication {
    /// Routes a room event to the topic it belongs on
    pub fn from_room_event(room_id: RoomId, event: RoomEvent) -> Self {
        let topic = match &event {
            RoomEvent::ParticipantJoined { .. }
            | RoomEvent::ParticipantLeft { .. }
            | RoomEvent::PresenceChanged { .. }
            | RoomEvent::RoleChanged { .. }
            | RoomEvent::LeaderChanged { .. } => Topic::RoomState(room_id),
            RoomEvent::EntryAdded { .. }
            | RoomEvent::EntryRemoved { .. }
            | RoomEvent::VotesUpdated { .. }
            | RoomEvent::EntryFinished { .. } => Topic::RoomQueue(room_id),
            RoomEvent::NowPlaying { .. } => Topic::RoomNowPlaying(room_id),
            RoomEvent::CommandIssued { .. } => Topic::RoomCommands(room_id),
        };

        let payload = match event {
            RoomEvent::CommandIssued { command } => Payload::Command(command),
            event => Payload::Event(event),
        };

        Self { topic, payload }
    }

    pub fn sync(user_id: UserId, snapshot: SyncSnapshot) -> Self {
        Self {
            topic: Topic::UserSyncResponse(user_id),
            payload: Payload::Sync(snapshot),
        }
    }

    /// Reports a refused request back to the user who sent it
    pub fn error(user_id: UserId, error: ErrorPayload) -> Self {
        Self {
            topic: Topic::UserSyncResponse(user_id),
            payload: Payload::Error(error),
        }
    }
}

/// Operations a client sends to its room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    RequestSync,
    #[serde(rename_all = "camelCase")]
    IssuePlaybackCommand {
        action: PlaybackAction,
        #[serde(default)]
        seek_position_seconds: Option<f64>,
    },
    Heartbeat,
    Presence {
        state: ConnectionState,
    },
    Skip,
    PlayNext,
    #[serde(rename_all = "camelCase")]
    Submit {
        media_ref: String,
        title: String,
        #[serde(default)]
        duration_seconds: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Vote {
        entry_id: EntryId,
        vote_type: VoteType,
    },
}
