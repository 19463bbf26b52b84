mod id;

pub use id::*;

/// The type used for keys handed out by the persistence layer.
pub type PrimaryKey = u32;

pub type RoomId = PrimaryKey;
pub type UserId = PrimaryKey;
pub type EntryId = PrimaryKey;
