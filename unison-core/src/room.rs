use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    AdvanceReason, BoxedQueue, Queue, Config, ConnectionState, EntryId, LinearQueue, MediaRef,
    NewQueueEntry, Participant, PlayHistoryEntry, Playback, PlaybackAction, PlaybackCommand,
    PlaybackStatus, Presence, QueueEntry, Role, RoomError, RoomEvent, RoomId, RoomSettings,
    SkipLatch, SyncSnapshot, Timestamp, Timing, UserId, VoteTally, VoteType,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    /// Only known members may join
    Private,
}

/// The static description of a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub visibility: Visibility,
    pub max_participants: Option<u32>,
    /// Fraction of online participants whose skip votes advance the queue
    pub skip_threshold: f64,
    pub settings: RoomSettings,
    pub created_by: UserId,
}

impl RoomInfo {
    pub fn validate(&self) -> Result<(), RoomError> {
        validate_skip_threshold(self.skip_threshold)
    }
}

pub fn validate_skip_threshold(threshold: f64) -> Result<(), RoomError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(RoomError::InvalidSkipThreshold(threshold));
    }

    Ok(())
}

/// The complete real-time state of a single room.
///
/// Every operation takes the current time and either fails without changing
/// anything, or applies its transition and queues the resulting events. The
/// owner is expected to drain them with [RoomState::take_events] and fan them
/// out, which keeps this type free of any I/O.
#[derive(Debug)]
pub struct RoomState {
    info: RoomInfo,
    config: Config,
    queue: BoxedQueue,
    playback: Playback,
    presence: Presence,
    skip_latch: SkipLatch,
    history: Vec<PlayHistoryEntry>,
    events: Vec<RoomEvent>,
}

impl RoomState {
    pub fn new(info: RoomInfo, config: Config) -> Self {
        let playback = Playback::new(info.id);
        let presence = Presence::new(info.id);

        Self {
            info,
            config,
            queue: Box::new(LinearQueue::new()),
            playback,
            presence,
            skip_latch: Default::default(),
            history: vec![],
            events: vec![],
        }
    }

    /// Rebuilds a room from persisted state. Presence is never restored,
    /// everyone has to join again.
    pub fn restore(
        info: RoomInfo,
        config: Config,
        playback: Option<Playback>,
        entries: Vec<QueueEntry>,
        history: Vec<PlayHistoryEntry>,
    ) -> Self {
        let mut state = Self::new(info, config);

        for entry in entries {
            state.queue.push(entry);
        }

        if let Some(mut playback) = playback {
            playback.room_id = state.info.id;

            if let Some(current) = &playback.current {
                state.queue.remove(current.id);
            }

            state.playback = playback;
        }

        state.history = history;
        state
    }

    pub fn id(&self) -> RoomId {
        self.info.id
    }

    pub fn info(&self) -> &RoomInfo {
        &self.info
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn leader(&self) -> Option<UserId> {
        self.presence.leader()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.presence.participants().to_vec()
    }

    /// The waiting entries, in play order
    pub fn queue_entries(&self) -> Vec<QueueEntry> {
        self.queue.peek().into_iter().cloned().collect()
    }

    pub fn history(&self) -> &[PlayHistoryEntry] {
        &self.history
    }

    /// Returns and clears the events produced since the last call
    pub fn take_events(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: RoomEvent) {
        self.events.push(event);
    }

    fn timing(&self, now: Timestamp) -> Timing {
        Timing {
            issued_at: now,
            scheduled_at: self.config.scheduled_from(now),
        }
    }

    /// Checks that a submission is acceptable and returns the entry to create.
    ///
    /// The entry only becomes part of the queue once it was assigned an id and
    /// handed to [RoomState::accept_submission].
    pub fn prepare_submission(
        &self,
        user_id: UserId,
        media_ref: &str,
        title: &str,
        duration_seconds: Option<f64>,
        now: Timestamp,
    ) -> Result<NewQueueEntry, RoomError> {
        let participant = self
            .presence
            .get(user_id)
            .ok_or(RoomError::NotParticipant(user_id))?;

        let settings = &self.info.settings;

        if !settings.listener_submissions
            && !participant.role.has_authority()
            && self.presence.leader() != Some(user_id)
        {
            return Err(RoomError::Forbidden("add entries to the queue"));
        }

        let media_ref = MediaRef::parse(media_ref)?;
        settings.check_duration(duration_seconds)?;

        if settings.is_banned(&media_ref.to_string()) {
            return Err(RoomError::MediaBanned);
        }

        let recently_played = self
            .history
            .iter()
            .filter(|record| record.entry.media_ref == media_ref)
            .any(|record| settings.is_cooling_down(record.finished_at, now));

        if recently_played {
            return Err(RoomError::RecentlyPlayed);
        }

        let entries = self.queue.peek();

        if settings.is_queue_full(entries.len()) {
            return Err(RoomError::QueueFull);
        }

        let queued_by_user = entries.iter().filter(|e| e.submitted_by == user_id).count();

        if !settings.can_user_add_more(queued_by_user) {
            return Err(RoomError::SubmissionLimitReached);
        }

        let is_duplicate = entries
            .iter()
            .copied()
            .chain(self.playback.current.as_ref())
            .any(|e| e.media_ref == media_ref);

        if is_duplicate && !settings.allow_duplicates {
            return Err(RoomError::DuplicateEntry);
        }

        let title = match title.trim() {
            "" => media_ref.to_string(),
            title => title.to_string(),
        };

        Ok(NewQueueEntry {
            room_id: self.info.id,
            submitted_by: user_id,
            media_ref,
            title,
            duration_seconds,
            position: self.queue.next_position(),
            created_at: now,
        })
    }

    /// Adds a prepared entry to the queue
    pub fn accept_submission(&mut self, entry: QueueEntry) -> QueueEntry {
        self.queue.push(entry.clone());
        self.emit(RoomEvent::EntryAdded {
            entry: entry.clone(),
        });

        entry
    }

    pub fn remove_entry(&mut self, entry_id: EntryId, user_id: UserId) -> Result<QueueEntry, RoomError> {
        if !self.presence.is_participant(user_id) {
            return Err(RoomError::NotParticipant(user_id));
        }

        if self.current_id() == Some(entry_id) {
            return Err(RoomError::CurrentEntryRemoval);
        }

        let entry = self
            .queue
            .get(entry_id)
            .ok_or(RoomError::EntryNotFound(entry_id))?;

        if entry.submitted_by != user_id && !self.presence.has_authority(user_id) {
            return Err(RoomError::Forbidden("remove this entry"));
        }

        let removed = self
            .queue
            .remove(entry_id)
            .ok_or(RoomError::EntryNotFound(entry_id))?;

        self.emit(RoomEvent::EntryRemoved { entry_id });
        Ok(removed)
    }

    /// Casts or withdraws a vote. A skip vote that pushes the current entry
    /// over the threshold advances the queue.
    pub fn vote(
        &mut self,
        entry_id: EntryId,
        user_id: UserId,
        vote_type: VoteType,
        now: Timestamp,
    ) -> Result<VoteTally, RoomError> {
        if !self.presence.is_participant(user_id) {
            return Err(RoomError::NotParticipant(user_id));
        }

        let is_current = self.current_id() == Some(entry_id);

        let entry = match self.playback.current.as_mut().filter(|_| is_current) {
            Some(current) => current,
            None => self
                .queue
                .get_mut(entry_id)
                .ok_or(RoomError::EntryNotFound(entry_id))?,
        };

        let cast = entry.toggle_vote(user_id, vote_type);
        let tally = entry.tally();

        self.emit(RoomEvent::VotesUpdated { tally });

        if is_current && cast && vote_type == VoteType::Skip {
            let online = self.presence.online_count();
            let threshold = self.info.skip_threshold;

            if self
                .skip_latch
                .evaluate(entry_id, tally.skip_votes, online, threshold)
            {
                self.advance(AdvanceReason::SkipThreshold, now);
            }
        }

        Ok(tally)
    }

    /// Moves on to the next entry, or stops if the queue is empty.
    /// Returns the new current entry.
    pub fn play_next(
        &mut self,
        requester: Option<UserId>,
        now: Timestamp,
    ) -> Result<Option<QueueEntry>, RoomError> {
        if let Some(user_id) = requester {
            self.presence.authorize(user_id, "advance the queue")?;
        }

        self.advance(AdvanceReason::PlayNext, now);
        Ok(self.playback.current.clone())
    }

    pub fn skip(&mut self, user_id: UserId, now: Timestamp) -> Result<Option<QueueEntry>, RoomError> {
        self.presence.authorize(user_id, "skip")?;

        if self.playback.current.is_none() {
            return Err(RoomError::NothingPlaying);
        }

        self.advance(AdvanceReason::Skipped, now);
        Ok(self.playback.current.clone())
    }

    /// Runs a transport transition on behalf of `user_id`.
    ///
    /// Returns the command every client should apply, or `None` if a play
    /// request found nothing to play.
    pub fn issue_command(
        &mut self,
        user_id: UserId,
        action: PlaybackAction,
        seek_position_seconds: Option<f64>,
        now: Timestamp,
    ) -> Result<Option<PlaybackCommand>, RoomError> {
        let verb = match action {
            PlaybackAction::Play => "play",
            PlaybackAction::Pause => "pause",
            PlaybackAction::Seek => "seek",
            PlaybackAction::Stop => "stop",
        };

        self.presence.authorize(user_id, verb)?;

        let timing = self.timing(now);

        let command = match action {
            PlaybackAction::Play if self.playback.current.is_none() => {
                let command = self.advance(AdvanceReason::PlayNext, now);
                self.take_leadership(user_id);

                return Ok(command);
            }
            PlaybackAction::Play => {
                let command = self.playback.play(seek_position_seconds, timing)?;
                self.take_leadership(user_id);

                command
            }
            PlaybackAction::Pause => self.playback.pause(seek_position_seconds, timing)?,
            PlaybackAction::Seek => {
                let position = seek_position_seconds.ok_or(RoomError::MissingSeekPosition)?;
                self.playback.seek(position, timing)?
            }
            PlaybackAction::Stop => {
                let (finished, command) = self.playback.stop(timing);

                if let Some(entry) = finished {
                    self.record_finished(entry, false, now);
                    self.emit(RoomEvent::NowPlaying {
                        entry: None,
                        reason: AdvanceReason::Stopped,
                    });
                }

                command
            }
        };

        self.emit(RoomEvent::CommandIssued {
            command: command.clone(),
        });

        Ok(Some(command))
    }

    pub fn join(&mut self, user_id: UserId, role: Role, now: Timestamp) -> Result<Participant, RoomError> {
        let (participant, is_new) =
            self.presence
                .join(user_id, role, now, self.info.max_participants)?;

        if is_new {
            self.emit(RoomEvent::ParticipantJoined {
                participant: participant.clone(),
            });
        } else {
            self.emit(RoomEvent::PresenceChanged {
                user_id,
                state: ConnectionState::Online,
            });
        }

        self.reconcile_leadership();
        Ok(participant)
    }

    pub fn leave(&mut self, user_id: UserId) -> Result<Participant, RoomError> {
        let participant = self.presence.leave(user_id)?;

        self.emit(RoomEvent::ParticipantLeft { user_id });
        self.reconcile_leadership();

        Ok(participant)
    }

    pub fn heartbeat(&mut self, user_id: UserId, now: Timestamp) -> Result<(), RoomError> {
        if self.presence.heartbeat(user_id, now)? {
            self.emit(RoomEvent::PresenceChanged {
                user_id,
                state: ConnectionState::Online,
            });
            self.reconcile_leadership();
        }

        Ok(())
    }

    pub fn set_presence(
        &mut self,
        user_id: UserId,
        state: ConnectionState,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        if self.presence.set_state(user_id, state, now)? {
            self.emit(RoomEvent::PresenceChanged { user_id, state });
            self.reconcile_leadership();
        }

        Ok(())
    }

    /// Marks participants that stopped sending heartbeats as offline
    pub fn sweep(&mut self, now: Timestamp) -> Vec<UserId> {
        let offline = self.presence.sweep(now, self.config.offline_timeout_ms());

        for &user_id in &offline {
            self.emit(RoomEvent::PresenceChanged {
                user_id,
                state: ConnectionState::Offline,
            });
        }

        if !offline.is_empty() {
            debug!("Room {}: {:?} went offline", self.info.id, offline);
            self.reconcile_leadership();
        }

        offline
    }

    /// Changes a participant's role. Callers are trusted to have checked who may do this.
    pub fn assign_role(&mut self, user_id: UserId, role: Role) -> Result<(), RoomError> {
        if self.presence.assign_role(user_id, role)? {
            self.emit(RoomEvent::RoleChanged { user_id, role });
            self.reconcile_leadership();
        }

        Ok(())
    }

    pub fn snapshot(&self, now: Timestamp) -> SyncSnapshot {
        let playback = &self.playback;

        SyncSnapshot {
            room_id: self.info.id,
            seq: playback.seq,
            status: playback.status,
            current: playback.current.clone(),
            position_seconds: playback.position_seconds,
            anchor: playback.anchor,
            effective_at: playback.effective_at,
            leader: self.presence.leader(),
            server_time: now,
        }
    }

    fn current_id(&self) -> Option<EntryId> {
        self.playback.current.as_ref().map(|c| c.id)
    }

    fn take_leadership(&mut self, user_id: UserId) {
        if self.presence.set_leader(user_id) {
            self.emit(RoomEvent::LeaderChanged {
                leader: Some(user_id),
            });
        }
    }

    fn reconcile_leadership(&mut self) {
        if let Some(leader) = self.presence.reconcile() {
            self.emit(RoomEvent::LeaderChanged { leader });
        }
    }

    /// Finishes the current entry and starts the next one.
    /// Returns the issued command, if anything changed.
    fn advance(&mut self, reason: AdvanceReason, now: Timestamp) -> Option<PlaybackCommand> {
        let timing = self.timing(now);

        let (finished, command) = match self.queue.next() {
            Some(mut next) => {
                next.clear_skip_votes();

                let finished = self.playback.current.take();
                (finished, self.playback.load(next, timing))
            }
            None if self.playback.current.is_some()
                || self.playback.status != PlaybackStatus::Stopped =>
            {
                self.playback.stop(timing)
            }
            None => return None,
        };

        if let Some(entry) = finished {
            self.record_finished(entry, reason.is_skip(), now);
        }

        debug!(
            "Room {} advanced ({:?}), now playing {:?}",
            self.info.id,
            reason,
            self.current_id()
        );

        self.emit(RoomEvent::NowPlaying {
            entry: self.playback.current.clone(),
            reason,
        });
        self.emit(RoomEvent::CommandIssued {
            command: command.clone(),
        });

        Some(command)
    }

    fn record_finished(&mut self, entry: QueueEntry, was_skipped: bool, now: Timestamp) {
        let record = PlayHistoryEntry {
            upvotes: entry.upvote_count(),
            skip_votes: entry.skip_vote_count(),
            entry,
            leader: self.presence.leader(),
            was_skipped,
            participant_count: self.presence.online_count(),
            finished_at: now,
        };

        self.history.push(record.clone());
        self.emit(RoomEvent::EntryFinished { record });
    }
}
