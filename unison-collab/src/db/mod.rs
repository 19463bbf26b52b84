use async_trait::async_trait;
use thiserror::Error;
use unison_core::{
    EntryId, NewQueueEntry, Participant, PlayHistoryEntry, Playback, QueueEntry, RoomId, UserId,
};

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod rest;
pub use rest::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult<T> {
    /// Turns a NotFound error into `None`
    fn optional(self) -> Result<Option<T>>;
}

impl<T> DatabaseResult<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can store unison data.
///
/// Room actors write through this after every accepted mutation, and read
/// from it when rooms are restored on startup.
#[async_trait]
pub trait Database
where
    Self: Send + Sync + 'static,
{
    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn user_by_id(&self, user_id: UserId) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn room_by_id(&self, room_id: RoomId) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData>;
    async fn delete_room_member(&self, room_id: RoomId, user_id: UserId) -> Result<()>;

    async fn list_queue_entries(&self, room_id: RoomId) -> Result<Vec<QueueEntry>>;
    async fn create_queue_entry(&self, new_entry: NewQueueEntry) -> Result<QueueEntry>;
    /// Stores the entry as given, including its votes
    async fn update_queue_entry(&self, entry: QueueEntry) -> Result<()>;
    async fn delete_queue_entry(&self, room_id: RoomId, entry_id: EntryId) -> Result<()>;

    async fn playback_by_room(&self, room_id: RoomId) -> Result<Playback>;
    async fn save_playback(&self, playback: Playback) -> Result<()>;

    async fn save_participant(&self, participant: Participant) -> Result<()>;
    async fn delete_participant(&self, room_id: RoomId, user_id: UserId) -> Result<()>;

    async fn create_history_entry(&self, room_id: RoomId, record: PlayHistoryEntry) -> Result<()>;
    async fn list_history(&self, room_id: RoomId) -> Result<Vec<PlayHistoryEntry>>;
}
