use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unison_core::{PrimaryKey, Role, RoomId, RoomInfo, RoomSettings, UserId, Visibility};

/// A unison account, as known to the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
}

/// Login session data for authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    /// The user that is logged in
    pub user: UserData,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A listening room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub id: RoomId,
    pub name: String,
    pub visibility: Visibility,
    pub max_participants: Option<u32>,
    pub skip_threshold: f64,
    #[serde(default)]
    pub settings: RoomSettings,
    pub created_by: UserId,
    #[serde(default)]
    pub members: Vec<RoomMemberData>,
}

impl RoomData {
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            visibility: self.visibility,
            max_participants: self.max_participants,
            skip_threshold: self.skip_threshold,
            settings: self.settings.clone(),
            created_by: self.created_by,
        }
    }

    pub fn member(&self, user_id: UserId) -> Option<&RoomMemberData> {
        self.members.iter().find(|m| m.user_id == user_id)
    }
}

/// A known member of a room, and the role they get when joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberData {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub name: String,
    pub visibility: Visibility,
    pub max_participants: Option<u32>,
    pub skip_threshold: f64,
    pub settings: RoomSettings,
    pub created_by: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoomMember {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
}
