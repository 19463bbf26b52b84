use serde::{Deserialize, Serialize};

use crate::{RoomError, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Listener,
    Moderator,
    Leader,
}

impl Role {
    /// Whether this role may issue playback commands and remove entries
    pub fn has_authority(&self) -> bool {
        matches!(self, Self::Moderator | Self::Leader)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
    pub connection_state: ConnectionState,
    pub last_heartbeat_at: Timestamp,
    pub joined_at: Timestamp,
}

impl Participant {
    pub fn is_online(&self) -> bool {
        self.connection_state == ConnectionState::Online
    }
}

/// Tracks who is in a room, who is reachable, and who currently leads.
#[derive(Debug, Clone)]
pub struct Presence {
    room_id: RoomId,
    /// Participants in join order
    participants: Vec<Participant>,
    leader: Option<UserId>,
}

impl Presence {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            participants: vec![],
            leader: None,
        }
    }

    pub fn leader(&self) -> Option<UserId> {
        self.leader
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn get(&self, user_id: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    fn get_mut(&mut self, user_id: UserId) -> Result<&mut Participant, RoomError> {
        self.participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(RoomError::NotParticipant(user_id))
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.get(user_id).is_some()
    }

    /// The number of participants counted when tallying skip votes
    pub fn online_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_online()).count()
    }

    /// Adds a participant, or brings an existing one back online with the given role.
    /// Returns the participant and whether it is new.
    pub fn join(
        &mut self,
        user_id: UserId,
        role: Role,
        now: Timestamp,
        capacity: Option<u32>,
    ) -> Result<(Participant, bool), RoomError> {
        if let Ok(existing) = self.get_mut(user_id) {
            existing.role = role;
            existing.connection_state = ConnectionState::Online;
            existing.last_heartbeat_at = now;

            return Ok((existing.clone(), false));
        }

        if capacity.is_some_and(|max| self.participants.len() >= max as usize) {
            return Err(RoomError::RoomFull);
        }

        let participant = Participant {
            room_id: self.room_id,
            user_id,
            role,
            connection_state: ConnectionState::Online,
            last_heartbeat_at: now,
            joined_at: now,
        };

        self.participants.push(participant.clone());
        Ok((participant, true))
    }

    pub fn leave(&mut self, user_id: UserId) -> Result<Participant, RoomError> {
        let index = self
            .participants
            .iter()
            .position(|p| p.user_id == user_id)
            .ok_or(RoomError::NotParticipant(user_id))?;

        Ok(self.participants.remove(index))
    }

    /// Records a heartbeat. Returns true if the participant came back online.
    pub fn heartbeat(&mut self, user_id: UserId, now: Timestamp) -> Result<bool, RoomError> {
        let participant = self.get_mut(user_id)?;
        let was_offline = !participant.is_online();

        participant.last_heartbeat_at = now;
        participant.connection_state = ConnectionState::Online;

        Ok(was_offline)
    }

    /// Sets the connection state explicitly. Returns true if it changed.
    pub fn set_state(
        &mut self,
        user_id: UserId,
        state: ConnectionState,
        now: Timestamp,
    ) -> Result<bool, RoomError> {
        let participant = self.get_mut(user_id)?;
        let changed = participant.connection_state != state;

        participant.connection_state = state;

        if state == ConnectionState::Online {
            participant.last_heartbeat_at = now;
        }

        Ok(changed)
    }

    /// Marks everyone who has not sent a heartbeat within `timeout_ms` as offline.
    /// Returns the users that went offline.
    pub fn sweep(&mut self, now: Timestamp, timeout_ms: i64) -> Vec<UserId> {
        self.participants
            .iter_mut()
            .filter(|p| p.is_online() && now - p.last_heartbeat_at >= timeout_ms)
            .map(|p| {
                p.connection_state = ConnectionState::Offline;
                p.user_id
            })
            .collect()
    }

    pub fn assign_role(&mut self, user_id: UserId, role: Role) -> Result<bool, RoomError> {
        let participant = self.get_mut(user_id)?;
        let changed = participant.role != role;

        participant.role = role;
        Ok(changed)
    }

    /// Makes the user the current leader. Returns true if leadership changed.
    pub fn set_leader(&mut self, user_id: UserId) -> bool {
        let changed = self.leader != Some(user_id);
        self.leader = Some(user_id);

        changed
    }

    /// Whether the user may currently run playback transitions
    pub fn has_authority(&self, user_id: UserId) -> bool {
        let Some(participant) = self.get(user_id) else {
            return false;
        };

        participant.is_online()
            && (self.leader == Some(user_id) || participant.role.has_authority())
    }

    /// Fails with a permission error unless the user may currently `action`
    pub fn authorize(&self, user_id: UserId, action: &'static str) -> Result<(), RoomError> {
        if !self.is_participant(user_id) {
            return Err(RoomError::NotParticipant(user_id));
        }

        if !self.has_authority(user_id) {
            return Err(RoomError::Forbidden(action));
        }

        Ok(())
    }

    /// Re-evaluates who leads the room after presence or roles changed.
    ///
    /// An online leader keeps leading. Otherwise leadership falls back to the
    /// earliest joined online participant with the Leader role, then one with
    /// the Moderator role, or to nobody. Returns the new leader if it changed.
    pub fn reconcile(&mut self) -> Option<Option<UserId>> {
        let leader_online = self
            .leader
            .and_then(|id| self.get(id))
            .is_some_and(|p| p.is_online());

        if leader_online {
            return None;
        }

        let fallback = [Role::Leader, Role::Moderator].into_iter().find_map(|role| {
            self.participants
                .iter()
                .filter(|p| p.is_online() && p.role == role)
                .min_by_key(|p| p.joined_at)
                .map(|p| p.user_id)
        });

        if fallback == self.leader {
            return None;
        }

        self.leader = fallback;
        Some(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: i64 = 60_000;

    fn room() -> Presence {
        let mut presence = Presence::new(1);

        presence.join(1, Role::Leader, 0, None).unwrap();
        presence.join(2, Role::Moderator, 10, None).unwrap();
        presence.join(3, Role::Listener, 20, None).unwrap();
        presence.reconcile();

        presence
    }

    #[test]
    fn leader_falls_back_to_moderator() {
        let mut presence = room();
        assert_eq!(presence.leader(), Some(1));

        // Leader stops sending heartbeats, the others keep going
        presence.heartbeat(2, 50_000).unwrap();
        presence.heartbeat(3, 50_000).unwrap();

        assert_eq!(presence.sweep(59_999, TIMEOUT), Vec::<UserId>::new());
        assert_eq!(presence.sweep(60_000, TIMEOUT), vec![1]);
        assert_eq!(presence.reconcile(), Some(Some(2)));
        assert!(presence.authorize(2, "pause").is_ok());
        assert_eq!(presence.online_count(), 2);
    }

    #[test]
    fn listeners_have_no_authority_without_leader() {
        let mut presence = room();

        presence.set_state(1, ConnectionState::Offline, 1_000).unwrap();
        presence.set_state(2, ConnectionState::Offline, 1_000).unwrap();

        assert_eq!(presence.reconcile(), Some(None));
        assert_eq!(
            presence.authorize(3, "pause"),
            Err(RoomError::Forbidden("pause"))
        );
        assert_eq!(
            presence.authorize(9, "pause"),
            Err(RoomError::NotParticipant(9))
        );

        // A moderator coming back takes over
        assert!(presence.heartbeat(2, 2_000).unwrap());
        assert_eq!(presence.reconcile(), Some(Some(2)));
        assert_eq!(presence.reconcile(), None);
    }

    #[test]
    fn offline_authority_is_ignored() {
        let mut presence = room();
        presence.set_state(2, ConnectionState::Offline, 0).unwrap();

        assert!(!presence.has_authority(2));
        assert!(presence.has_authority(1));
    }

    #[test]
    fn capacity_counts_participants() {
        let mut presence = room();

        assert_eq!(presence.join(4, Role::Listener, 0, Some(3)), Err(RoomError::RoomFull));

        // Rejoining is not limited
        let (participant, is_new) = presence.join(3, Role::Listener, 5, Some(3)).unwrap();
        assert!(!is_new);
        assert_eq!(participant.joined_at, 20);
    }
}
