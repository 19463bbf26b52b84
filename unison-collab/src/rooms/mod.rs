mod room;

use log::{info, warn};
use unison_core::{
    validate_skip_threshold, Participant, Role, RoomError, RoomId, RoomState, UserId, Visibility,
};

use crate::{CollabContext, CollabError, Database, DatabaseResult, NewRoom, NewRoomMember};

pub use room::*;

pub struct RoomManager<Db> {
    context: CollabContext<Db>,
}

impl<Db> RoomManager<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Restores the rooms from the database on init
    pub async fn restore(&self) -> Result<(), CollabError> {
        let db = &self.context.database;

        for room_data in db.list_rooms().await? {
            let info = room_data.info();

            if let Err(err) = info.validate() {
                warn!("Not restoring room {}: {}", info.id, err);
                continue;
            }

            let entries = db.list_queue_entries(info.id).await?;
            let playback = db.playback_by_room(info.id).await.optional()?;
            let history = db.list_history(info.id).await?;

            let state = RoomState::restore(
                info,
                self.context.config.clone(),
                playback,
                entries,
                history,
            );

            let handle = RoomHandle::spawn(&self.context, state);
            self.context.rooms.insert(handle.id(), handle);
        }

        info!("Restored {} rooms", self.context.rooms.len());
        Ok(())
    }

    /// Creates a new room. The creator becomes its first member, with the leader role.
    pub async fn create_room(&self, new_room: NewRoom) -> Result<RoomHandle, CollabError> {
        validate_skip_threshold(new_room.skip_threshold)?;

        let db = &self.context.database;
        let created_by = new_room.created_by;

        let mut room_data = db.create_room(new_room).await?;

        let member = db
            .create_room_member(NewRoomMember {
                room_id: room_data.id,
                user_id: created_by,
                role: Role::Leader,
            })
            .await?;

        room_data.members.push(member);

        let state = RoomState::new(room_data.info(), self.context.config.clone());
        let handle = RoomHandle::spawn(&self.context, state);

        self.context.rooms.insert(handle.id(), handle.clone());
        info!("Room {} created by {}", room_data.name, created_by);

        Ok(handle)
    }

    pub fn get(&self, room_id: RoomId) -> Result<RoomHandle, CollabError> {
        self.context
            .rooms
            .get(&room_id)
            .map(|r| r.clone())
            .ok_or_else(|| RoomError::RoomNotFound(room_id).into())
    }

    /// Get all rooms in memory
    pub fn list_all(&self) -> Vec<RoomHandle> {
        let mut rooms: Vec<_> = self.context.rooms.iter().map(|r| r.clone()).collect();
        rooms.sort_by_key(|r| r.id());

        rooms
    }

    /// Joins a room as a participant.
    ///
    /// Known members get the role they were given. Anyone else may join a
    /// public room as a listener, and becomes a member by doing so.
    pub async fn join(&self, room_id: RoomId, user_id: UserId) -> Result<Participant, CollabError> {
        let room = self.get(room_id)?;
        let db = &self.context.database;

        let room_data = db.room_by_id(room_id).await?;

        match room_data.member(user_id) {
            Some(member) => room.join(user_id, member.role).await,
            None if room_data.visibility == Visibility::Public => {
                let participant = room.join(user_id, Role::Listener).await?;

                db.create_room_member(NewRoomMember {
                    room_id,
                    user_id,
                    role: Role::Listener,
                })
                .await?;

                Ok(participant)
            }
            None => Err(RoomError::Forbidden("join this room").into()),
        }
    }

    pub async fn leave(&self, room_id: RoomId, user_id: UserId) -> Result<(), CollabError> {
        self.get(room_id)?.leave(user_id).await?;
        Ok(())
    }
}
