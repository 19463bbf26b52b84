use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use unison_core::{
    ClientMessage, ConnectionState, EntryId, Participant, PlayHistoryEntry, PlaybackAction,
    PlaybackCommand, Publication, QueueEntry, Role, RoomError, RoomEvent, RoomId, RoomInfo,
    RoomState, SyncSnapshot, Timestamp, UserId, VoteTally, VoteType,
};

use crate::{Broadcaster, CollabContext, CollabError, Database, Subscription};

type RoomTask = Box<dyn FnOnce(&mut RoomState, Timestamp) + Send>;

enum RoomMessage {
    /// Runs a synchronous operation against the state
    Apply(RoomTask),
    /// Submissions need an id from the database before they can be queued
    Submit {
        user_id: UserId,
        media_ref: String,
        title: String,
        duration_seconds: Option<f64>,
        reply: oneshot::Sender<Result<QueueEntry, CollabError>>,
    },
    /// A live connection of a user was opened or closed
    Connection {
        user_id: UserId,
        connected: bool,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },
}

/// A handle to a running room.
///
/// Every room is owned by a single task, and handles only send it messages,
/// so operations on a room are applied one at a time in arrival order.
#[derive(Clone)]
pub struct RoomHandle {
    id: RoomId,
    sender: mpsc::Sender<RoomMessage>,
    broadcaster: Arc<Broadcaster>,
}

impl RoomHandle {
    /// Starts the actor owning `state` and returns a handle to it
    pub fn spawn<Db>(context: &CollabContext<Db>, state: RoomState) -> Self
    where
        Db: Database,
    {
        let id = state.id();
        let (sender, receiver) = mpsc::channel(context.config.channel_capacity);

        let actor = RoomActor {
            state,
            receiver,
            context: context.clone(),
            connections: Default::default(),
        };

        let task = tokio::spawn(actor.run());

        tokio::spawn(async move {
            if let Err(err) = task.await {
                error!("Room {} actor failed: {}", id, err);
            }
        });

        Self {
            id,
            sender,
            broadcaster: context.broadcaster.clone(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    async fn apply<T, F>(&self, operation: F) -> Result<T, CollabError>
    where
        F: FnOnce(&mut RoomState, Timestamp) -> Result<T, RoomError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();

        let task: RoomTask = Box::new(move |state, now| {
            let _ = reply.send(operation(state, now));
        });

        self.send(RoomMessage::Apply(task)).await?;

        let result = response
            .await
            .map_err(|_| RoomError::RoomUnavailable(self.id))?;

        Ok(result?)
    }

    async fn send(&self, message: RoomMessage) -> Result<(), CollabError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| RoomError::RoomUnavailable(self.id).into())
    }

    pub async fn info(&self) -> Result<RoomInfo, CollabError> {
        self.apply(|state, _| Ok(state.info().clone())).await
    }

    pub async fn join(&self, user_id: UserId, role: Role) -> Result<Participant, CollabError> {
        self.apply(move |state, now| state.join(user_id, role, now))
            .await
    }

    pub async fn leave(&self, user_id: UserId) -> Result<Participant, CollabError> {
        self.apply(move |state, _| state.leave(user_id)).await
    }

    pub async fn heartbeat(&self, user_id: UserId) -> Result<(), CollabError> {
        self.apply(move |state, now| state.heartbeat(user_id, now))
            .await
    }

    pub async fn set_presence(
        &self,
        user_id: UserId,
        connection_state: ConnectionState,
    ) -> Result<(), CollabError> {
        self.apply(move |state, now| state.set_presence(user_id, connection_state, now))
            .await
    }

    /// Counts a live connection of the user, such as an open gateway socket
    pub async fn connect(&self, user_id: UserId) -> Result<(), CollabError> {
        self.connection(user_id, true).await.map(|_| ())
    }

    /// Forgets a live connection of the user. Once their last one is gone they
    /// are marked offline, and true is returned.
    pub async fn disconnect(&self, user_id: UserId) -> Result<bool, CollabError> {
        self.connection(user_id, false).await
    }

    async fn connection(&self, user_id: UserId, connected: bool) -> Result<bool, CollabError> {
        let (reply, response) = oneshot::channel();

        self.send(RoomMessage::Connection {
            user_id,
            connected,
            reply,
        })
        .await?;

        let result = response
            .await
            .map_err(|_| RoomError::RoomUnavailable(self.id))?;

        Ok(result?)
    }

    pub async fn assign_role(&self, user_id: UserId, role: Role) -> Result<(), CollabError> {
        self.apply(move |state, _| state.assign_role(user_id, role))
            .await
    }

    /// Marks silent participants offline right away, instead of waiting for
    /// the next periodic sweep
    pub async fn sweep(&self) -> Result<Vec<UserId>, CollabError> {
        self.apply(|state, now| Ok(state.sweep(now))).await
    }

    pub async fn submit(
        &self,
        user_id: UserId,
        media_ref: &str,
        title: &str,
        duration_seconds: Option<f64>,
    ) -> Result<QueueEntry, CollabError> {
        let (reply, response) = oneshot::channel();

        self.send(RoomMessage::Submit {
            user_id,
            media_ref: media_ref.to_string(),
            title: title.to_string(),
            duration_seconds,
            reply,
        })
        .await?;

        response
            .await
            .map_err(|_| RoomError::RoomUnavailable(self.id))?
    }

    pub async fn remove_entry(
        &self,
        entry_id: EntryId,
        user_id: UserId,
    ) -> Result<QueueEntry, CollabError> {
        self.apply(move |state, _| state.remove_entry(entry_id, user_id))
            .await
    }

    pub async fn vote(
        &self,
        entry_id: EntryId,
        user_id: UserId,
        vote_type: VoteType,
    ) -> Result<VoteTally, CollabError> {
        self.apply(move |state, now| state.vote(entry_id, user_id, vote_type, now))
            .await
    }

    /// Advances the queue. `None` as requester means the system asked,
    /// for example because the current entry ended.
    pub async fn play_next(
        &self,
        requester: Option<UserId>,
    ) -> Result<Option<QueueEntry>, CollabError> {
        self.apply(move |state, now| state.play_next(requester, now))
            .await
    }

    pub async fn skip(&self, user_id: UserId) -> Result<Option<QueueEntry>, CollabError> {
        self.apply(move |state, now| state.skip(user_id, now)).await
    }

    pub async fn issue_command(
        &self,
        user_id: UserId,
        action: PlaybackAction,
        seek_position_seconds: Option<f64>,
    ) -> Result<Option<PlaybackCommand>, CollabError> {
        self.apply(move |state, now| {
            state.issue_command(user_id, action, seek_position_seconds, now)
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<SyncSnapshot, CollabError> {
        self.apply(|state, now| Ok(state.snapshot(now))).await
    }

    /// Sends a fresh snapshot to the user on their sync response topic
    pub async fn request_sync(&self, user_id: UserId) -> Result<SyncSnapshot, CollabError> {
        let snapshot = self
            .apply(move |state, now| {
                if !state.presence().is_participant(user_id) {
                    return Err(RoomError::NotParticipant(user_id));
                }

                Ok(state.snapshot(now))
            })
            .await?;

        self.broadcaster
            .publish(Publication::sync(user_id, snapshot.clone()));

        Ok(snapshot)
    }

    pub async fn participants(&self) -> Result<Vec<Participant>, CollabError> {
        self.apply(|state, _| Ok(state.participants())).await
    }

    pub async fn queue(&self) -> Result<Vec<QueueEntry>, CollabError> {
        self.apply(|state, _| Ok(state.queue_entries())).await
    }

    pub async fn history(&self) -> Result<Vec<PlayHistoryEntry>, CollabError> {
        self.apply(|state, _| Ok(state.history().to_vec())).await
    }

    pub fn subscribe(&self, user_id: UserId) -> Subscription {
        self.broadcaster.subscribe(self.id, user_id)
    }

    /// Runs an operation sent by a connected client. Results reach the
    /// client through its subscription.
    pub async fn dispatch(&self, user_id: UserId, message: ClientMessage) -> Result<(), CollabError> {
        match message {
            ClientMessage::RequestSync => {
                self.request_sync(user_id).await?;
            }
            ClientMessage::IssuePlaybackCommand {
                action,
                seek_position_seconds,
            } => {
                self.issue_command(user_id, action, seek_position_seconds)
                    .await?;
            }
            ClientMessage::Heartbeat => self.heartbeat(user_id).await?,
            ClientMessage::Presence { state } => self.set_presence(user_id, state).await?,
            ClientMessage::Skip => {
                self.skip(user_id).await?;
            }
            ClientMessage::PlayNext => {
                self.play_next(Some(user_id)).await?;
            }
            ClientMessage::Submit {
                media_ref,
                title,
                duration_seconds,
            } => {
                self.submit(user_id, &media_ref, &title, duration_seconds)
                    .await?;
            }
            ClientMessage::Vote {
                entry_id,
                vote_type,
            } => {
                self.vote(entry_id, user_id, vote_type).await?;
            }
        }

        Ok(())
    }
}

/// The single writer of a room's state
struct RoomActor<Db> {
    state: RoomState,
    receiver: mpsc::Receiver<RoomMessage>,
    context: CollabContext<Db>,
    /// Live connections per user
    connections: HashMap<UserId, usize>,
}

impl<Db> RoomActor<Db>
where
    Db: Database,
{
    async fn run(mut self) {
        info!("Room {} ({}) started", self.state.id(), self.state.info().name);

        let mut sweeper = tokio::time::interval(self.state.config().heartbeat_interval());
        sweeper.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately
        sweeper.tick().await;

        loop {
            tokio::select! {
                message = self.receiver.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                _ = sweeper.tick() => {
                    let now = self.context.clock.now();
                    self.state.sweep(now);
                }
            }

            self.flush().await;
        }

        self.context.broadcaster.close_room(self.state.id());
        info!("Room {} stopped", self.state.id());
    }

    async fn handle(&mut self, message: RoomMessage) {
        let now = self.context.clock.now();

        match message {
            RoomMessage::Apply(task) => task(&mut self.state, now),
            RoomMessage::Submit {
                user_id,
                media_ref,
                title,
                duration_seconds,
                reply,
            } => {
                let result = self
                    .submit(user_id, &media_ref, &title, duration_seconds, now)
                    .await;

                let _ = reply.send(result);
            }
            RoomMessage::Connection {
                user_id,
                connected,
                reply,
            } => {
                let result = self.connection(user_id, connected, now);
                let _ = reply.send(result);
            }
        }
    }

    fn connection(
        &mut self,
        user_id: UserId,
        connected: bool,
        now: Timestamp,
    ) -> Result<bool, RoomError> {
        let count = self.connections.entry(user_id).or_default();

        if connected {
            *count += 1;
            return Ok(false);
        }

        *count = count.saturating_sub(1);

        if *count > 0 {
            debug!(
                "Room {}: user {} still has {} connections",
                self.state.id(),
                user_id,
                count
            );
            return Ok(false);
        }

        self.connections.remove(&user_id);
        self.state
            .set_presence(user_id, ConnectionState::Offline, now)?;

        Ok(true)
    }

    async fn submit(
        &mut self,
        user_id: UserId,
        media_ref: &str,
        title: &str,
        duration_seconds: Option<f64>,
        now: Timestamp,
    ) -> Result<QueueEntry, CollabError> {
        let new_entry =
            self.state
                .prepare_submission(user_id, media_ref, title, duration_seconds, now)?;

        let entry = self.context.database.create_queue_entry(new_entry).await?;

        debug!(
            "Room {}: {} submitted {} as entry {}",
            self.state.id(),
            user_id,
            entry.media_ref,
            entry.id
        );

        Ok(self.state.accept_submission(entry))
    }

    /// Publishes and persists everything that happened since the last flush
    async fn flush(&mut self) {
        let events = self.state.take_events();
        let room_id = self.state.id();

        for event in &events {
            self.context
                .broadcaster
                .publish(Publication::from_room_event(room_id, event.clone()));
        }

        for event in events {
            if let Err(err) = self.persist(event).await {
                match err {
                    CollabError::Database(e) if e.is_not_found() => {}
                    err => warn!("Room {}: failed to persist change: {}", room_id, err),
                }
            }
        }
    }

    async fn persist(&self, event: RoomEvent) -> Result<(), CollabError> {
        let room_id = self.state.id();
        let db = &self.context.database;

        match event {
            RoomEvent::ParticipantJoined { participant } => {
                db.save_participant(participant).await?;
            }
            RoomEvent::PresenceChanged { user_id, .. } | RoomEvent::RoleChanged { user_id, .. } => {
                if let Some(participant) = self.state.presence().get(user_id) {
                    db.save_participant(participant.clone()).await?;
                }
            }
            RoomEvent::ParticipantLeft { user_id } => {
                db.delete_participant(room_id, user_id).await?;
            }
            RoomEvent::EntryRemoved { entry_id } => {
                db.delete_queue_entry(room_id, entry_id).await?;
            }
            RoomEvent::VotesUpdated { tally } => {
                let playback = self.state.playback();

                if playback.current.as_ref().map(|c| c.id) == Some(tally.entry_id) {
                    db.save_playback(playback.clone()).await?;
                } else if let Some(entry) = self
                    .state
                    .queue_entries()
                    .into_iter()
                    .find(|e| e.id == tally.entry_id)
                {
                    db.update_queue_entry(entry).await?;
                }
            }
            RoomEvent::EntryFinished { record } => {
                db.create_history_entry(room_id, record).await?;
            }
            RoomEvent::NowPlaying {
                entry: Some(entry), ..
            } => {
                // The current entry lives in the playback state from now on
                db.delete_queue_entry(room_id, entry.id).await?;
            }
            RoomEvent::CommandIssued { .. } => {
                db.save_playback(self.state.playback().clone()).await?;
            }
            RoomEvent::EntryAdded { .. }
            | RoomEvent::LeaderChanged { .. }
            | RoomEvent::NowPlaying { entry: None, .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use unison_core::{
        Config, ManualClock, Payload, PlaybackStatus, RoomSettings, Topic, Visibility,
    };

    use super::*;
    use crate::MemoryDatabase;

    const LEADER: UserId = 1;
    const MODERATOR: UserId = 2;
    const LISTENER: UserId = 3;
    const OTHER: UserId = 4;

    const START: Timestamp = 1_000_000;

    struct Fixture {
        room: RoomHandle,
        clock: Arc<ManualClock>,
        db: Arc<MemoryDatabase>,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(START));
        let db = Arc::new(MemoryDatabase::new());
        let config = Config::default();

        let room_data = db
            .create_room(crate::NewRoom {
                name: "Evening".to_string(),
                visibility: Visibility::Public,
                max_participants: None,
                skip_threshold: 0.5,
                settings: RoomSettings::default(),
                created_by: LEADER,
            })
            .await
            .unwrap();

        let context = CollabContext {
            database: db.clone(),
            broadcaster: Arc::new(Broadcaster::new(config.channel_capacity)),
            clock: clock.clone(),
            rooms: Default::default(),
            config: config.clone(),
        };

        let room = RoomHandle::spawn(&context, RoomState::new(room_data.info(), config));

        room.join(LEADER, Role::Leader).await.unwrap();
        room.join(MODERATOR, Role::Moderator).await.unwrap();
        room.join(LISTENER, Role::Listener).await.unwrap();
        room.join(OTHER, Role::Listener).await.unwrap();

        Fixture { room, clock, db }
    }

    async fn next_command(subscription: &mut Subscription) -> PlaybackCommand {
        loop {
            let publication = subscription.recv().await.unwrap();

            if let Payload::Command(command) = &publication.payload {
                assert_eq!(publication.topic, Topic::RoomCommands(command.room_id));
                return command.clone();
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_scheduled_and_persisted() {
        let Fixture { room, clock, db } = fixture().await;
        let mut subscription = room.subscribe(LISTENER);

        for media in ["aaaaaaaaaa1", "aaaaaaaaaa2", "aaaaaaaaaa3"] {
            room.submit(LISTENER, media, "Song", Some(200.))
                .await
                .unwrap();
        }

        assert_eq!(db.list_queue_entries(room.id()).await.unwrap().len(), 3);

        let first = room.play_next(Some(LEADER)).await.unwrap().unwrap();
        let command = next_command(&mut subscription).await;

        assert_eq!(command.action, PlaybackAction::Play);
        assert_eq!(command.entry_id, Some(first.id));
        assert_eq!(command.scheduled_execution_timestamp, START + 2000);

        clock.advance(12_000);
        room.issue_command(LEADER, PlaybackAction::Pause, None)
            .await
            .unwrap();

        let paused = next_command(&mut subscription).await;
        assert_eq!(paused.action, PlaybackAction::Pause);
        assert_eq!(paused.seek_position_seconds, Some(10.));
        assert!(paused.seq > command.seq);

        clock.advance(5_000);
        room.issue_command(LEADER, PlaybackAction::Play, None)
            .await
            .unwrap();

        let resumed = next_command(&mut subscription).await;
        assert_eq!(resumed.seek_position_seconds, Some(10.));

        let stored = db.playback_by_room(room.id()).await.unwrap();
        assert_eq!(stored.status, PlaybackStatus::Playing);
        assert_eq!(stored.seq, resumed.seq);

        // The current entry is no longer part of the stored queue
        assert_eq!(db.list_queue_entries(room.id()).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_skip_votes_advance_once() {
        let Fixture { room, .. } = fixture().await;

        room.submit(LISTENER, "aaaaaaaaaa1", "", Some(200.))
            .await
            .unwrap();
        room.submit(OTHER, "aaaaaaaaaa2", "", Some(200.))
            .await
            .unwrap();

        let current = room.play_next(None).await.unwrap().unwrap();

        let votes = [LEADER, MODERATOR, LISTENER, OTHER].map(|user_id| {
            let room = room.clone();
            tokio::spawn(async move { room.vote(current.id, user_id, VoteType::Skip).await })
        });

        let mut accepted = 0;

        for vote in votes {
            match vote.await.unwrap() {
                Ok(_) => accepted += 1,
                // Votes arriving after the skip target an entry that is gone
                Err(err) => assert!(matches!(
                    err,
                    CollabError::Room(RoomError::EntryNotFound(id)) if id == current.id
                )),
            }
        }

        assert_eq!(accepted, 2);

        let history = room.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].was_skipped);

        let snapshot = room.snapshot().await.unwrap();
        assert_ne!(snapshot.current.map(|c| c.id), Some(current.id));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_leader_hands_over_to_moderator() {
        let Fixture { room, clock, db } = fixture().await;

        clock.advance(40_000);
        room.heartbeat(MODERATOR).await.unwrap();
        room.heartbeat(LISTENER).await.unwrap();

        clock.advance(20_000);
        let offline = room.sweep().await.unwrap();

        assert_eq!(offline, vec![LEADER, OTHER]);
        assert_eq!(room.snapshot().await.unwrap().leader, Some(MODERATOR));

        let stored: Vec<_> = db
            .participants(room.id())
            .into_iter()
            .filter(|p| !p.is_online())
            .map(|p| p.user_id)
            .collect();

        assert_eq!(stored, vec![LEADER, OTHER]);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_is_sent_to_the_requester_only() {
        let Fixture { room, .. } = fixture().await;

        let mut mine = room.subscribe(LISTENER);
        let snapshot = room.request_sync(LISTENER).await.unwrap();

        let publication = mine.recv().await.unwrap();
        assert_eq!(publication.topic, Topic::UserSyncResponse(LISTENER));
        assert_eq!(publication.payload, Payload::Sync(snapshot));

        assert!(matches!(
            room.request_sync(99).await,
            Err(CollabError::Room(RoomError::NotParticipant(99)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submissions_are_not_stored() {
        let Fixture { room, db, .. } = fixture().await;

        let result = room.submit(LISTENER, "not a media ref", "", None).await;

        assert!(matches!(
            result,
            Err(CollabError::Room(RoomError::InvalidMediaRef(_)))
        ));
        assert!(db.list_queue_entries(room.id()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn last_connection_closing_marks_the_user_offline() {
        let Fixture { room, .. } = fixture().await;

        let is_online = |participants: Vec<Participant>| {
            participants
                .iter()
                .any(|p| p.user_id == LISTENER && p.is_online())
        };

        room.connect(LISTENER).await.unwrap();
        room.connect(LISTENER).await.unwrap();

        assert!(!room.disconnect(LISTENER).await.unwrap());
        assert!(is_online(room.participants().await.unwrap()));

        assert!(room.disconnect(LISTENER).await.unwrap());
        assert!(!is_online(room.participants().await.unwrap()));
    }
}
