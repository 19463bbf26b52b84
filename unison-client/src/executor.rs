use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use unison_core::{
    millis_to_seconds, EntryId, Id, MediaRef, PlaybackAction, PlaybackCommand, PlaybackStatus,
    SharedClock, SyncSnapshot, Timestamp,
};

use crate::LocalPlayer;

type ExecutionId = Id<Pending>;

/// Applies room commands and snapshots to a [LocalPlayer] at their scheduled instants.
///
/// At most one execution is pending at any time. Anything newer cancels and
/// replaces it, and commands carrying a seq at or below the last accepted one
/// are dropped.
pub struct PlaybackExecutor<P> {
    player: Arc<P>,
    clock: SharedClock,
    state: Arc<Mutex<ExecutorState>>,
}

#[derive(Default)]
struct ExecutorState {
    last_seq: Option<u64>,
    pending: Option<Pending>,
    /// The last snapshot that was scheduled, for deduplication
    applied: Option<SyncSnapshot>,
    loaded: Option<EntryId>,
}

struct Pending {
    id: ExecutionId,
    seq: u64,
    task: JoinHandle<()>,
}

enum Work {
    Command(PlaybackCommand),
    Sync(SyncSnapshot),
}

impl<P> Clone for PlaybackExecutor<P> {
    fn clone(&self) -> Self {
        Self {
            player: self.player.clone(),
            clock: self.clock.clone(),
            state: self.state.clone(),
        }
    }
}

impl<P> PlaybackExecutor<P>
where
    P: LocalPlayer,
{
    pub fn new(player: Arc<P>, clock: SharedClock) -> Self {
        Self {
            player,
            clock,
            state: Default::default(),
        }
    }

    pub fn player(&self) -> &Arc<P> {
        &self.player
    }

    /// The seq of the last accepted command or snapshot
    pub fn last_seq(&self) -> Option<u64> {
        self.state.lock().last_seq
    }

    /// The seq of the execution waiting for its instant, if any
    pub fn pending_seq(&self) -> Option<u64> {
        self.state.lock().pending.as_ref().map(|p| p.seq)
    }

    /// Schedules a command. Returns false if it was dropped as stale.
    pub fn apply_command(&self, command: PlaybackCommand) -> bool {
        let mut state = self.state.lock();

        if state.last_seq.is_some_and(|last| command.seq <= last) {
            debug!(
                "Dropping stale {:?} command {} (last was {:?})",
                command.action, command.seq, state.last_seq
            );
            return false;
        }

        let seq = command.seq;
        let at = command.scheduled_execution_timestamp;

        state.last_seq = Some(seq);
        state.applied = None;

        self.schedule(&mut state, seq, at, Work::Command(command));
        true
    }

    /// Lines the player up with a snapshot, cancelling anything pending.
    ///
    /// Returns false if nothing had to be done, either because an equivalent
    /// snapshot was already applied, or because newer commands were seen since.
    pub fn apply_sync(&self, snapshot: SyncSnapshot) -> bool {
        let mut state = self.state.lock();

        if state
            .applied
            .as_ref()
            .is_some_and(|applied| applied.is_equivalent(&snapshot))
        {
            debug!("Snapshot {} already applied", snapshot.seq);
            return false;
        }

        if state.last_seq.is_some_and(|last| snapshot.seq < last) {
            debug!("Dropping outdated snapshot {}", snapshot.seq);
            return false;
        }

        let seq = snapshot.seq;
        let at = snapshot.apply_at(self.clock.now());

        state.last_seq = Some(seq);
        state.applied = Some(snapshot.clone());

        self.schedule(&mut state, seq, at, Work::Sync(snapshot));
        true
    }

    /// Forgets all pending work and fencing state, leaving the player as is
    pub fn reset(&self) {
        let mut state = self.state.lock();

        if let Some(pending) = state.pending.take() {
            pending.task.abort();
        }

        state.last_seq = None;
        state.applied = None;
    }

    fn schedule(&self, state: &mut ExecutorState, seq: u64, at: Timestamp, work: Work) {
        if let Some(pending) = state.pending.take() {
            debug!("Execution {} superseded by {}", pending.seq, seq);
            pending.task.abort();
        }

        let id = ExecutionId::new();
        let delay = (at - self.clock.now()).max(0) as u64;

        let player = self.player.clone();
        let clock = self.clock.clone();
        let shared = self.state.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let mut state = shared.lock();

            // Superseded after the timer fired
            if state.pending.as_ref().map(|p| p.id) != Some(id) || state.last_seq != Some(seq) {
                return;
            }

            state.pending = None;
            state.execute(player.as_ref(), work, clock.now());
        });

        state.pending = Some(Pending { id, seq, task });
    }
}

impl ExecutorState {
    fn execute<P>(&mut self, player: &P, work: Work, now: Timestamp)
    where
        P: LocalPlayer,
    {
        match work {
            Work::Command(command) => self.run_command(player, command, now),
            Work::Sync(snapshot) => self.run_sync(player, snapshot, now),
        }
    }

    fn run_command<P>(&mut self, player: &P, command: PlaybackCommand, now: Timestamp)
    where
        P: LocalPlayer,
    {
        let lateness = millis_to_seconds((now - command.scheduled_execution_timestamp).max(0));
        let position = command.seek_position_seconds;

        debug!(
            "Executing {:?} {} at {:?}, {}s late",
            command.action, command.seq, position, lateness
        );

        if command.action == PlaybackAction::Stop {
            player.stop();
            self.loaded = None;
            return;
        }

        // The pending work this replaced may have been what loaded the entry
        self.ensure_loaded(player, command.entry_id, &command.media_ref, &command.title);

        match command.status {
            PlaybackStatus::Playing => {
                player.seek(position.unwrap_or(0.) + lateness);
                player.play();
            }
            PlaybackStatus::Paused | PlaybackStatus::Stopped => {
                player.pause();

                if let Some(position) = position {
                    player.seek(position);
                }
            }
        }
    }

    fn run_sync<P>(&mut self, player: &P, snapshot: SyncSnapshot, now: Timestamp)
    where
        P: LocalPlayer,
    {
        let Some(entry) = snapshot.current.as_ref() else {
            if self.loaded.is_some() {
                player.stop();
            }

            self.loaded = None;
            return;
        };

        let media_ref = Some(entry.media_ref.clone());
        let title = Some(entry.title.clone());
        self.ensure_loaded(player, Some(entry.id), &media_ref, &title);

        match snapshot.status {
            PlaybackStatus::Playing => {
                player.seek(snapshot.position_at(now));
                player.play();
            }
            PlaybackStatus::Paused | PlaybackStatus::Stopped => {
                player.pause();
                player.seek(snapshot.position_seconds);
            }
        }
    }

    fn ensure_loaded<P>(
        &mut self,
        player: &P,
        entry_id: Option<EntryId>,
        media_ref: &Option<MediaRef>,
        title: &Option<String>,
    ) where
        P: LocalPlayer,
    {
        if self.loaded == entry_id {
            return;
        }

        if let Some(media_ref) = media_ref {
            player.load(media_ref, title.as_deref().unwrap_or_default());
            self.loaded = entry_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use unison_core::{NewQueueEntry, QueueEntry};

    use super::*;
    use crate::player::testing::{Call, RecordingPlayer};
    use crate::TokioClock;

    const START: Timestamp = 1_000_000;

    fn entry(id: EntryId, media: &str) -> QueueEntry {
        NewQueueEntry {
            room_id: 1,
            submitted_by: 1,
            media_ref: MediaRef::parse(media).unwrap(),
            title: "Song".to_string(),
            duration_seconds: Some(200.),
            position: 10_000,
            created_at: 0,
        }
        .with_id(id)
    }

    fn command(
        seq: u64,
        action: PlaybackAction,
        entry: &QueueEntry,
        position: f64,
        at: Timestamp,
    ) -> PlaybackCommand {
        let status = match action {
            PlaybackAction::Play | PlaybackAction::Seek => PlaybackStatus::Playing,
            PlaybackAction::Pause => PlaybackStatus::Paused,
            PlaybackAction::Stop => PlaybackStatus::Stopped,
        };

        PlaybackCommand {
            room_id: 1,
            seq,
            action,
            status,
            entry_id: Some(entry.id),
            media_ref: Some(entry.media_ref.clone()),
            title: Some(entry.title.clone()),
            seek_position_seconds: Some(position),
            scheduled_execution_timestamp: at,
            issued_at: at - 2000,
        }
    }

    fn snapshot(
        status: PlaybackStatus,
        entry: &QueueEntry,
        anchor: Timestamp,
        server_time: Timestamp,
    ) -> SyncSnapshot {
        SyncSnapshot {
            room_id: 1,
            seq: 4,
            status,
            current: Some(entry.clone()),
            position_seconds: 10.,
            anchor: Some(anchor),
            effective_at: Some(anchor),
            leader: Some(1),
            server_time,
        }
    }

    fn executor() -> PlaybackExecutor<RecordingPlayer> {
        let clock = Arc::new(TokioClock::starting_at(START));
        PlaybackExecutor::new(Arc::new(RecordingPlayer::default()), clock)
    }

    async fn wait(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap();
        assert!(
            (actual - expected).abs() < 0.05,
            "expected about {}, got {}",
            expected,
            actual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn later_command_replaces_pending_one() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");
        let b = entry(2, "bbbbbbbbbbb");

        assert!(executor.apply_command(command(1, PlaybackAction::Play, &a, 0., START + 2000)));
        assert!(executor.apply_command(command(2, PlaybackAction::Play, &b, 0., START + 5000)));
        assert_eq!(executor.pending_seq(), Some(2));

        wait(3000).await;
        assert!(executor.player().calls().is_empty());

        wait(7000).await;
        let calls = executor.player().calls();

        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::Load(b.media_ref.to_string()));
        assert_eq!(calls[2], Call::Play);
        assert_close(executor.player().last_seek(), 0.);
        assert_eq!(executor.pending_seq(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_commands_are_dropped() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        assert!(executor.apply_command(command(5, PlaybackAction::Play, &a, 0., START + 2000)));
        assert!(!executor.apply_command(command(5, PlaybackAction::Pause, &a, 1., START + 2000)));
        assert!(!executor.apply_command(command(3, PlaybackAction::Stop, &a, 0., START + 2000)));

        wait(3000).await;
        assert_eq!(executor.player().calls().last(), Some(&Call::Play));
        assert_eq!(executor.last_seq(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn late_commands_catch_up() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        // Arrived half a second after it should have applied
        executor.apply_command(command(1, PlaybackAction::Play, &a, 10., START - 500));
        wait(1).await;

        assert_close(executor.player().last_seek(), 10.5);
        assert_eq!(executor.player().calls().last(), Some(&Call::Play));
    }

    #[tokio::test(start_paused = true)]
    async fn joining_mid_entry_starts_at_elapsed_position() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        assert!(executor.apply_sync(snapshot(PlaybackStatus::Playing, &a, START - 37_000, START)));
        wait(1).await;

        let calls = executor.player().calls();
        assert_eq!(calls.first(), Some(&Call::Load(a.media_ref.to_string())));
        assert_eq!(calls.last(), Some(&Call::Play));
        assert_close(executor.player().last_seek(), 37.);
    }

    #[tokio::test(start_paused = true)]
    async fn applying_the_same_snapshot_twice_does_nothing() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        assert!(executor.apply_sync(snapshot(PlaybackStatus::Playing, &a, START - 5_000, START)));
        wait(10).await;

        let calls = executor.player().calls();
        assert_eq!(calls.len(), 3);

        // Same state, requested a moment later
        assert!(!executor.apply_sync(snapshot(PlaybackStatus::Playing, &a, START - 5_000, START + 10)));
        assert_eq!(executor.pending_seq(), None);

        wait(10).await;
        assert_eq!(executor.player().calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_snapshot_holds_position() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        let mut paused = snapshot(PlaybackStatus::Paused, &a, START, START);
        paused.anchor = None;

        executor.apply_sync(paused);
        wait(1).await;

        assert_eq!(
            executor.player().calls(),
            vec![
                Call::Load(a.media_ref.to_string()),
                Call::Pause,
                Call::Seek(10.)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_waits_for_effective_instant() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        // Issued just now, effective in two seconds, starting from zero
        executor.apply_sync(snapshot(PlaybackStatus::Playing, &a, START + 2000, START));

        wait(1000).await;
        assert!(executor.player().calls().is_empty());

        wait(1500).await;
        assert_close(executor.player().last_seek(), 0.);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_forgets_pending_work_and_fencing() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        executor.apply_command(command(9, PlaybackAction::Play, &a, 0., START + 2000));
        executor.reset();

        assert_eq!(executor.pending_seq(), None);
        assert_eq!(executor.last_seq(), None);

        assert!(executor.apply_command(command(1, PlaybackAction::Pause, &a, 3., START + 100)));

        wait(3000).await;
        assert_eq!(
            executor.player().calls(),
            vec![
                Call::Load(a.media_ref.to_string()),
                Call::Pause,
                Call::Seek(3.)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_unloads_media() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        executor.apply_command(command(1, PlaybackAction::Play, &a, 0., START));
        wait(1).await;

        let mut stop = command(2, PlaybackAction::Stop, &a, 0., START + 10);
        stop.seek_position_seconds = None;
        executor.apply_command(stop);
        wait(20).await;

        executor.apply_command(command(3, PlaybackAction::Play, &a, 0., START + 30));
        wait(20).await;

        let loads = executor
            .player()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Load(_)))
            .count();

        assert_eq!(loads, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_replacing_a_pending_play_switches_entry() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");
        let b = entry(2, "bbbbbbbbbbb");

        executor.apply_command(command(1, PlaybackAction::Play, &a, 0., START));
        wait(1).await;

        // The seek lands before the play of the next entry fires
        executor.apply_command(command(2, PlaybackAction::Play, &b, 0., START + 2000));
        executor.apply_command(command(3, PlaybackAction::Seek, &b, 30., START + 2500));
        wait(3000).await;

        let calls = executor.player().calls();
        let last_load = calls.iter().rev().find(|c| matches!(c, Call::Load(_)));

        assert_eq!(last_load, Some(&Call::Load(b.media_ref.to_string())));
        assert_eq!(calls.last(), Some(&Call::Play));
        assert_close(executor.player().last_seek(), 30.);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_replacing_a_pending_sync_loads_and_plays() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        // A joiner waiting for the entry to start
        executor.apply_sync(snapshot(PlaybackStatus::Playing, &a, START + 2000, START));
        executor.apply_command(command(5, PlaybackAction::Seek, &a, 30., START + 2500));
        wait(3000).await;

        let calls = executor.player().calls();

        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::Load(a.media_ref.to_string()));
        assert_eq!(calls[2], Call::Play);
        assert_close(executor.player().last_seek(), 30.);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_while_paused_stays_paused() {
        let executor = executor();
        let a = entry(1, "aaaaaaaaaaa");

        let mut seek = command(1, PlaybackAction::Seek, &a, 42., START);
        seek.status = PlaybackStatus::Paused;

        executor.apply_command(seek);
        wait(1).await;

        assert_eq!(
            executor.player().calls(),
            vec![
                Call::Load(a.media_ref.to_string()),
                Call::Pause,
                Call::Seek(42.)
            ]
        );
    }
}
