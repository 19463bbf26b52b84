use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use unison_core::{
    EntryId, NewQueueEntry, Participant, PlayHistoryEntry, Playback, PrimaryKey, QueueEntry,
    RoomId, UserId,
};

use crate::{
    Database, DatabaseError, NewRoom, NewRoomMember, NewSession, NewUser, Result, RoomData,
    RoomMemberData, SessionData, UserData,
};

/// An in-process database, used when no persistence service is configured
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    store: Mutex<MemoryStore>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    last_id: PrimaryKey,
    users: BTreeMap<UserId, UserData>,
    sessions: HashMap<String, (PrimaryKey, UserId, NewSession)>,
    rooms: BTreeMap<RoomId, RoomData>,
    entries: BTreeMap<EntryId, QueueEntry>,
    playbacks: HashMap<RoomId, Playback>,
    participants: HashMap<(RoomId, UserId), Participant>,
    history: BTreeMap<RoomId, Vec<PlayHistoryEntry>>,
}

impl MemoryStore {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the participants that were saved for a room
    pub fn participants(&self, room_id: RoomId) -> Vec<Participant> {
        let store = self.store.lock();

        let mut participants: Vec<_> = store
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();

        participants.sort_by_key(|p| (p.joined_at, p.user_id));
        participants
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let store = self.store.lock();

        let (id, user_id, session) = store
            .sessions
            .get(token)
            .ok_or_else(|| not_found("session", "token"))?;

        let user = store
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| not_found("user", "id"))?;

        Ok(SessionData {
            id: *id,
            token: session.token.clone(),
            user,
            expires_at: session.expires_at,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut store = self.store.lock();

        if store.sessions.contains_key(&new_session.token) {
            return Err(DatabaseError::Conflict {
                resource: "session",
                field: "token",
                value: new_session.token,
            });
        }

        let user = store
            .users
            .get(&new_session.user_id)
            .cloned()
            .ok_or_else(|| not_found("user", "id"))?;

        let id = store.next_id();
        let session = SessionData {
            id,
            token: new_session.token.clone(),
            user,
            expires_at: new_session.expires_at,
        };

        store.sessions.insert(
            new_session.token.clone(),
            (id, new_session.user_id, new_session),
        );

        Ok(session)
    }

    async fn user_by_id(&self, user_id: UserId) -> Result<UserData> {
        self.store
            .lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| not_found("user", "id"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut store = self.store.lock();

        if store.users.values().any(|u| u.username == new_user.username) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            });
        }

        let user = UserData {
            id: store.next_id(),
            username: new_user.username,
            display_name: new_user.display_name,
        };

        store.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<RoomData> {
        self.store
            .lock()
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| not_found("room", "id"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self.store.lock().rooms.values().cloned().collect())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut store = self.store.lock();

        let room = RoomData {
            id: store.next_id(),
            name: new_room.name,
            visibility: new_room.visibility,
            max_participants: new_room.max_participants,
            skip_threshold: new_room.skip_threshold,
            settings: new_room.settings,
            created_by: new_room.created_by,
            members: vec![],
        };

        store.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData> {
        let mut store = self.store.lock();

        let room = store
            .rooms
            .get_mut(&new_member.room_id)
            .ok_or_else(|| not_found("room", "id"))?;

        if room.member(new_member.user_id).is_some() {
            return Err(DatabaseError::Conflict {
                resource: "room member",
                field: "user_id",
                value: new_member.user_id.to_string(),
            });
        }

        let member = RoomMemberData {
            room_id: new_member.room_id,
            user_id: new_member.user_id,
            role: new_member.role,
        };

        room.members.push(member.clone());
        Ok(member)
    }

    async fn delete_room_member(&self, room_id: RoomId, user_id: UserId) -> Result<()> {
        let mut store = self.store.lock();

        let room = store
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| not_found("room", "id"))?;

        let before = room.members.len();
        room.members.retain(|m| m.user_id != user_id);

        if room.members.len() == before {
            return Err(not_found("room member", "user_id"));
        }

        Ok(())
    }

    async fn list_queue_entries(&self, room_id: RoomId) -> Result<Vec<QueueEntry>> {
        Ok(self
            .store
            .lock()
            .entries
            .values()
            .filter(|e| e.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn create_queue_entry(&self, new_entry: NewQueueEntry) -> Result<QueueEntry> {
        let mut store = self.store.lock();

        if !store.rooms.contains_key(&new_entry.room_id) {
            return Err(not_found("room", "id"));
        }

        let entry = new_entry.with_id(store.next_id());
        store.entries.insert(entry.id, entry.clone());

        Ok(entry)
    }

    async fn update_queue_entry(&self, entry: QueueEntry) -> Result<()> {
        let mut store = self.store.lock();

        let stored = store
            .entries
            .get_mut(&entry.id)
            .ok_or_else(|| not_found("queue entry", "id"))?;

        *stored = entry;
        Ok(())
    }

    async fn delete_queue_entry(&self, room_id: RoomId, entry_id: EntryId) -> Result<()> {
        let mut store = self.store.lock();

        match store.entries.get(&entry_id) {
            Some(entry) if entry.room_id == room_id => {
                store.entries.remove(&entry_id);
                Ok(())
            }
            _ => Err(not_found("queue entry", "id")),
        }
    }

    async fn playback_by_room(&self, room_id: RoomId) -> Result<Playback> {
        self.store
            .lock()
            .playbacks
            .get(&room_id)
            .cloned()
            .ok_or_else(|| not_found("playback", "room_id"))
    }

    async fn save_playback(&self, playback: Playback) -> Result<()> {
        self.store.lock().playbacks.insert(playback.room_id, playback);
        Ok(())
    }

    async fn save_participant(&self, participant: Participant) -> Result<()> {
        let key = (participant.room_id, participant.user_id);
        self.store.lock().participants.insert(key, participant);

        Ok(())
    }

    async fn delete_participant(&self, room_id: RoomId, user_id: UserId) -> Result<()> {
        self.store
            .lock()
            .participants
            .remove(&(room_id, user_id))
            .map(|_| ())
            .ok_or_else(|| not_found("participant", "user_id"))
    }

    async fn create_history_entry(&self, room_id: RoomId, record: PlayHistoryEntry) -> Result<()> {
        self.store
            .lock()
            .history
            .entry(room_id)
            .or_default()
            .push(record);

        Ok(())
    }

    async fn list_history(&self, room_id: RoomId) -> Result<Vec<PlayHistoryEntry>> {
        Ok(self
            .store
            .lock()
            .history
            .get(&room_id)
            .cloned()
            .unwrap_or_default())
    }
}
