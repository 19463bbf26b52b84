//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use serde::Serialize;
use unison_collab::UserData;
use unison_core::{
    ConnectionState, EntryId, Participant as CoreParticipant,
    PlayHistoryEntry as CorePlayHistoryEntry, PlaybackAction,
    PlaybackCommand as CorePlaybackCommand, PlaybackStatus, QueueEntry as CoreQueueEntry, Role,
    RoomId, RoomInfo, RoomSettings, SyncSnapshot as CoreSyncSnapshot, Timestamp, UserId,
    Visibility, VoteTally as CoreVoteTally,
};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: UserId,
    username: String,
    display_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: RoomId,
    name: String,
    #[schema(value_type = String, example = "PUBLIC")]
    visibility: Visibility,
    max_participants: Option<u32>,
    skip_threshold: f64,
    #[schema(value_type = Object)]
    settings: RoomSettings,
    created_by: UserId,
    #[schema(value_type = String, example = "PLAYING")]
    status: PlaybackStatus,
    now_playing: Option<QueueEntry>,
    leader: Option<UserId>,
    online_participants: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    user_id: UserId,
    #[schema(value_type = String, example = "LISTENER")]
    role: Role,
    #[schema(value_type = String, example = "ONLINE")]
    connection_state: ConnectionState,
    /// Epoch milliseconds
    last_heartbeat_at: Timestamp,
    joined_at: Timestamp,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    id: EntryId,
    submitted_by: UserId,
    /// Canonical media reference, such as `youtube:dQw4w9WgXcQ`
    media_ref: String,
    title: String,
    duration_seconds: Option<f64>,
    position: i64,
    upvote_count: usize,
    skip_vote_count: usize,
    created_at: Timestamp,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    entry_id: EntryId,
    upvotes: usize,
    skip_votes: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCommand {
    seq: u64,
    #[schema(value_type = String, example = "PLAY")]
    action: PlaybackAction,
    /// The room's status once the command applies
    #[schema(value_type = String, example = "PLAYING")]
    status: PlaybackStatus,
    entry_id: Option<EntryId>,
    media_ref: Option<String>,
    title: Option<String>,
    seek_position_seconds: Option<f64>,
    /// When every client executes the command, in epoch milliseconds
    scheduled_execution_timestamp: Timestamp,
    issued_at: Timestamp,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    room_id: RoomId,
    seq: u64,
    #[schema(value_type = String, example = "PAUSED")]
    status: PlaybackStatus,
    current: Option<QueueEntry>,
    position_seconds: f64,
    anchor: Option<Timestamp>,
    effective_at: Option<Timestamp>,
    leader: Option<UserId>,
    server_time: Timestamp,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayHistoryEntry {
    entry: QueueEntry,
    leader: Option<UserId>,
    was_skipped: bool,
    upvotes: usize,
    skip_votes: usize,
    participant_count: usize,
    finished_at: Timestamp,
}

/// Everything needed to describe a live room
pub struct RoomOverview {
    pub info: RoomInfo,
    pub snapshot: CoreSyncSnapshot,
    pub participants: Vec<CoreParticipant>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl<I, O> ToSerialized<Option<O>> for Option<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Option<O> {
        self.as_ref().map(|x| x.to_serialized())
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<Room> for RoomOverview {
    fn to_serialized(&self) -> Room {
        let info = &self.info;

        Room {
            id: info.id,
            name: info.name.clone(),
            visibility: info.visibility,
            max_participants: info.max_participants,
            skip_threshold: info.skip_threshold,
            settings: info.settings.clone(),
            created_by: info.created_by,
            status: self.snapshot.status,
            now_playing: self.snapshot.current.to_serialized(),
            leader: self.snapshot.leader,
            online_participants: self.participants.iter().filter(|p| p.is_online()).count(),
        }
    }
}

impl ToSerialized<Participant> for CoreParticipant {
    fn to_serialized(&self) -> Participant {
        Participant {
            user_id: self.user_id,
            role: self.role,
            connection_state: self.connection_state,
            last_heartbeat_at: self.last_heartbeat_at,
            joined_at: self.joined_at,
        }
    }
}

impl ToSerialized<QueueEntry> for CoreQueueEntry {
    fn to_serialized(&self) -> QueueEntry {
        QueueEntry {
            id: self.id,
            submitted_by: self.submitted_by,
            media_ref: self.media_ref.to_string(),
            title: self.title.clone(),
            duration_seconds: self.duration_seconds,
            position: self.position,
            upvote_count: self.upvote_count(),
            skip_vote_count: self.skip_vote_count(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<VoteTally> for CoreVoteTally {
    fn to_serialized(&self) -> VoteTally {
        VoteTally {
            entry_id: self.entry_id,
            upvotes: self.upvotes,
            skip_votes: self.skip_votes,
        }
    }
}

impl ToSerialized<PlaybackCommand> for CorePlaybackCommand {
    fn to_serialized(&self) -> PlaybackCommand {
        PlaybackCommand {
            seq: self.seq,
            action: self.action,
            status: self.status,
            entry_id: self.entry_id,
            media_ref: self.media_ref.as_ref().map(|m| m.to_string()),
            title: self.title.clone(),
            seek_position_seconds: self.seek_position_seconds,
            scheduled_execution_timestamp: self.scheduled_execution_timestamp,
            issued_at: self.issued_at,
        }
    }
}

impl ToSerialized<SyncSnapshot> for CoreSyncSnapshot {
    fn to_serialized(&self) -> SyncSnapshot {
        SyncSnapshot {
            room_id: self.room_id,
            seq: self.seq,
            status: self.status,
            current: self.current.to_serialized(),
            position_seconds: self.position_seconds,
            anchor: self.anchor,
            effective_at: self.effective_at,
            leader: self.leader,
            server_time: self.server_time,
        }
    }
}

impl ToSerialized<PlayHistoryEntry> for CorePlayHistoryEntry {
    fn to_serialized(&self) -> PlayHistoryEntry {
        PlayHistoryEntry {
            entry: self.entry.to_serialized(),
            leader: self.leader,
            was_skipped: self.was_skipped,
            upvotes: self.upvotes,
            skip_votes: self.skip_votes,
            participant_count: self.participant_count,
            finished_at: self.finished_at,
        }
    }
}
