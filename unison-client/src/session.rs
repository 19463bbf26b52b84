use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use unison_core::{
    ClientMessage, Config, ConnectionState, EntryId, Payload, PlaybackAction, Publication,
    RoomEvent, SharedClock, VoteType,
};

use crate::{ClientError, ClientResult, LocalPlayer, PlaybackExecutor, Transport};

/// Keeps a local player in a room: joins, syncs, sends heartbeats, and
/// reconnects with backoff when the connection drops.
pub struct ClientSession<T, P> {
    transport: T,
    executor: PlaybackExecutor<P>,
    config: Config,
    requests: mpsc::Receiver<ClientMessage>,
    events: broadcast::Sender<RoomEvent>,
}

/// Used by the application to act in the room. The session ends once every
/// handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<ClientMessage>,
    events: broadcast::Sender<RoomEvent>,
}

impl<T, P> ClientSession<T, P>
where
    T: Transport,
    P: LocalPlayer,
{
    pub fn new(
        transport: T,
        player: Arc<P>,
        clock: SharedClock,
        config: Config,
    ) -> (Self, SessionHandle) {
        let (request_sender, requests) = mpsc::channel(config.channel_capacity);
        let (events, _) = broadcast::channel(config.channel_capacity);

        let handle = SessionHandle {
            requests: request_sender,
            events: events.clone(),
        };

        let session = Self {
            transport,
            executor: PlaybackExecutor::new(player, clock),
            config,
            requests,
            events,
        };

        (session, handle)
    }

    pub fn executor(&self) -> PlaybackExecutor<P> {
        self.executor.clone()
    }

    /// Runs until every [SessionHandle] is dropped, or the connection can't be
    /// recovered.
    pub async fn run(mut self) -> ClientResult<()> {
        let mut attempt = 0;

        loop {
            match self.transport.connect().await {
                Ok(()) => {
                    attempt = 0;

                    match self.serve().await {
                        Ok(()) => {
                            self.executor.reset();
                            return Ok(());
                        }
                        Err(err) if err.is_connection() => {
                            warn!("Lost connection to room: {}", err)
                        }
                        Err(err) => return Err(err),
                    }
                }
                Err(err) if err.is_connection() => warn!("Could not connect to room: {}", err),
                Err(err) => return Err(err),
            }

            if self
                .config
                .reconnect_max_attempts
                .is_some_and(|max| attempt >= max)
            {
                return Err(ClientError::GaveUp(attempt));
            }

            let delay = jittered(self.config.reconnect_delay(attempt));
            attempt += 1;

            info!("Reconnecting in {:?} (attempt {})", delay, attempt);
            tokio::time::sleep(delay).await;
        }
    }

    async fn serve(&mut self) -> ClientResult<()> {
        // Anything scheduled belongs to the previous connection, start over from a snapshot
        self.executor.reset();
        self.transport.send(ClientMessage::RequestSync).await?;

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.tick().await;

        loop {
            tokio::select! {
                publication = self.transport.recv() => self.handle(publication?).await?,
                request = self.requests.recv() => match request {
                    Some(message) => self.transport.send(message).await?,
                    None => {
                        let offline = ClientMessage::Presence {
                            state: ConnectionState::Offline,
                        };

                        // Leaving anyway
                        let _ = self.transport.send(offline).await;
                        return Ok(());
                    }
                },
                _ = heartbeat.tick() => self.transport.send(ClientMessage::Heartbeat).await?,
            }
        }
    }

    async fn handle(&mut self, publication: Publication) -> ClientResult<()> {
        match publication.payload {
            Payload::Command(command) => {
                self.executor.apply_command(command);
            }
            Payload::Sync(snapshot) => {
                self.executor.apply_sync(snapshot);
            }
            Payload::Resync => {
                info!("Missed updates on {}, requesting sync", publication.topic);
                self.transport.send(ClientMessage::RequestSync).await?;
            }
            Payload::Error(error) => warn!("Room refused request: {}", error.message),
            Payload::Event(event) => {
                debug!("{}: {:?}", publication.topic, event);

                // Nobody listening is fine
                let _ = self.events.send(event);
            }
        }

        Ok(())
    }
}

impl SessionHandle {
    async fn request(&self, message: ClientMessage) -> ClientResult<()> {
        self.requests
            .send(message)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    async fn command(&self, action: PlaybackAction, position: Option<f64>) -> ClientResult<()> {
        self.request(ClientMessage::IssuePlaybackCommand {
            action,
            seek_position_seconds: position,
        })
        .await
    }

    /// Room events as they arrive, such as queue and presence changes
    pub fn events(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub async fn play(&self) -> ClientResult<()> {
        self.command(PlaybackAction::Play, None).await
    }

    pub async fn pause(&self) -> ClientResult<()> {
        self.command(PlaybackAction::Pause, None).await
    }

    pub async fn seek(&self, position_seconds: f64) -> ClientResult<()> {
        self.command(PlaybackAction::Seek, Some(position_seconds))
            .await
    }

    pub async fn stop(&self) -> ClientResult<()> {
        self.command(PlaybackAction::Stop, None).await
    }

    pub async fn skip(&self) -> ClientResult<()> {
        self.request(ClientMessage::Skip).await
    }

    pub async fn play_next(&self) -> ClientResult<()> {
        self.request(ClientMessage::PlayNext).await
    }

    pub async fn submit(
        &self,
        media_ref: &str,
        title: &str,
        duration_seconds: Option<f64>,
    ) -> ClientResult<()> {
        self.request(ClientMessage::Submit {
            media_ref: media_ref.to_string(),
            title: title.to_string(),
            duration_seconds,
        })
        .await
    }

    pub async fn vote(&self, entry_id: EntryId, vote_type: VoteType) -> ClientResult<()> {
        self.request(ClientMessage::Vote {
            entry_id,
            vote_type,
        })
        .await
    }

    pub async fn set_presence(&self, state: ConnectionState) -> ClientResult<()> {
        self.request(ClientMessage::Presence { state }).await
    }

    pub async fn request_sync(&self) -> ClientResult<()> {
        self.request(ClientMessage::RequestSync).await
    }
}

/// Spreads reconnects out by ±20 %
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;
    use unison_collab::{Collab, MemoryDatabase, NewRoom};
    use unison_core::{
        Clock, MediaRef, PlaybackCommand, PlaybackStatus, RoomId, RoomSettings, Timestamp, Topic,
        UserId, Visibility,
    };

    use super::*;
    use crate::player::testing::{Call, RecordingPlayer};
    use crate::{CollabTransport, TokioClock};

    const START: Timestamp = 1_000_000;
    const LEADER: UserId = 1;
    const LISTENER: UserId = 2;
    const LATECOMER: UserId = 3;

    async fn wait(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    fn join(
        collab: &Arc<Collab<MemoryDatabase>>,
        room_id: RoomId,
        user_id: UserId,
    ) -> (SessionHandle, Arc<RecordingPlayer>) {
        let player = Arc::new(RecordingPlayer::default());
        let transport = CollabTransport::new(collab, room_id, user_id);

        let (session, handle) = ClientSession::new(
            transport,
            player.clone(),
            collab.clock().clone(),
            collab.config().clone(),
        );

        tokio::spawn(session.run());
        (handle, player)
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_follow_the_leader() {
        let collab = Arc::new(Collab::with_clock(
            MemoryDatabase::new(),
            Config::default(),
            Arc::new(TokioClock::starting_at(START)),
        ));

        let room = collab
            .rooms
            .create_room(NewRoom {
                name: "Together".to_string(),
                visibility: Visibility::Public,
                max_participants: None,
                skip_threshold: 0.5,
                settings: RoomSettings::default(),
                created_by: LEADER,
            })
            .await
            .unwrap();

        let (leader, leader_player) = join(&collab, room.id(), LEADER);
        let (listener, listener_player) = join(&collab, room.id(), LISTENER);

        leader
            .submit("z09GolEktUw", "Song", Some(200.))
            .await
            .unwrap();
        leader.play().await.unwrap();

        wait(1000).await;
        assert!(listener_player.calls().is_empty());

        wait(2000).await;

        let media = MediaRef::YouTube("z09GolEktUw".to_string()).to_string();

        for player in [&leader_player, &listener_player] {
            let calls = player.calls();
            assert_eq!(calls.first(), Some(&Call::Load(media.clone())));
            assert_eq!(calls.last(), Some(&Call::Play));
        }

        // Someone joining 37 seconds in starts where everyone else is
        wait(37_000).await;
        let (_latecomer, latecomer_player) = join(&collab, room.id(), LATECOMER);
        wait(1).await;

        let snapshot = room.snapshot().await.unwrap();
        let expected = snapshot.position_at(snapshot.server_time);
        let seek = latecomer_player.last_seek().unwrap();

        assert!(expected > 37.);
        assert!((seek - expected).abs() < 0.1, "seeked to {}, expected {}", seek, expected);
        assert_eq!(latecomer_player.calls().last(), Some(&Call::Play));

        // A listener can't pause for everyone
        leader_player.clear();
        listener.pause().await.unwrap();
        wait(3000).await;
        assert!(leader_player.calls().is_empty());
    }

    /// Fails to connect a given number of times, then hands out whatever the test feeds it
    struct ScriptedTransport {
        failures: u32,
        connects: Arc<Mutex<u32>>,
        sent: Arc<Mutex<Vec<ClientMessage>>>,
        incoming: mpsc::UnboundedReceiver<ClientResult<Publication>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&mut self) -> ClientResult<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(ClientError::Connection("refused".to_string()));
            }

            *self.connects.lock() += 1;
            Ok(())
        }

        async fn send(&mut self, message: ClientMessage) -> ClientResult<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> ClientResult<Publication> {
            match self.incoming.recv().await {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    fn command(seq: u64, at: Timestamp) -> Publication {
        let media_ref = MediaRef::YouTube("z09GolEktUw".to_string());

        Publication {
            topic: Topic::RoomCommands(1),
            payload: Payload::Command(PlaybackCommand {
                room_id: 1,
                seq,
                action: PlaybackAction::Play,
                status: PlaybackStatus::Playing,
                entry_id: Some(1),
                media_ref: Some(media_ref),
                title: Some("Song".to_string()),
                seek_position_seconds: Some(0.),
                scheduled_execution_timestamp: at,
                issued_at: at - 2000,
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_backoff_and_starts_over() {
        let (feed, incoming) = mpsc::unbounded_channel();
        let connects = Arc::new(Mutex::new(0));
        let sent = Arc::new(Mutex::new(vec![]));

        let transport = ScriptedTransport {
            failures: 2,
            connects: connects.clone(),
            sent: sent.clone(),
            incoming,
        };

        let clock = Arc::new(TokioClock::starting_at(START));
        let player = Arc::new(RecordingPlayer::default());
        let (session, handle) =
            ClientSession::new(transport, player.clone(), clock.clone(), Config::default());

        let executor = session.executor();
        let started = Instant::now();
        let task = tokio::spawn(session.run());

        // Two failures wait at least 400 and 800 ms
        wait(1_100).await;
        assert_eq!(*connects.lock(), 0);

        wait(1_000).await;
        assert_eq!(*connects.lock(), 1);
        assert!(started.elapsed() >= Duration::from_millis(1_200));
        assert_eq!(sent.lock().first(), Some(&ClientMessage::RequestSync));

        feed.send(Ok(command(7, clock.now() + 2000))).unwrap();
        wait(10).await;
        assert_eq!(executor.last_seq(), Some(7));
        assert_eq!(executor.pending_seq(), Some(7));

        // Connection drops before the command fires
        feed.send(Err(ClientError::Disconnected)).unwrap();
        wait(3_000).await;

        assert_eq!(*connects.lock(), 2);
        assert_eq!(executor.last_seq(), None);
        assert!(player.calls().is_empty());

        let syncs = sent
            .lock()
            .iter()
            .filter(|m| **m == ClientMessage::RequestSync)
            .count();

        assert_eq!(syncs, 2);

        // Fencing starts over on the new connection
        feed.send(Ok(command(1, clock.now()))).unwrap();
        wait(10).await;
        assert_eq!(player.calls().last(), Some(&Call::Play));

        drop(handle);
        assert!(task.await.unwrap().is_ok());
        assert!(sent.lock().contains(&ClientMessage::Presence {
            state: ConnectionState::Offline
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let (_feed, incoming) = mpsc::unbounded_channel();

        let transport = ScriptedTransport {
            failures: u32::MAX,
            connects: Default::default(),
            sent: Default::default(),
            incoming,
        };

        let config = Config {
            reconnect_max_attempts: Some(3),
            ..Default::default()
        };

        let (session, _handle) = ClientSession::new(
            transport,
            Arc::new(RecordingPlayer::default()),
            Arc::new(TokioClock::starting_at(START)),
            config,
        );

        assert!(matches!(session.run().await, Err(ClientError::GaveUp(3))));
    }
}
