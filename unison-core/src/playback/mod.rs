mod command;

pub use command::*;

use serde::{Deserialize, Serialize};

use crate::{millis_to_seconds, seconds_to_millis, QueueEntry, RoomError, RoomId, Timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// The authoritative playback state of a room.
///
/// While playing, the position is never stored directly. Instead `anchor` is
/// the instant the media was at 0 seconds, so the position at any later
/// instant is simply the time elapsed since the anchor. Running transitions
/// anchor relative to their scheduled instant, because that is when clients
/// actually start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    pub room_id: RoomId,
    pub status: PlaybackStatus,
    pub current: Option<QueueEntry>,
    /// The position when not playing, or the position at `effective_at` when playing
    pub position_seconds: f64,
    pub anchor: Option<Timestamp>,
    /// When the last transition takes effect on clients
    pub effective_at: Option<Timestamp>,
    /// The seq of the last issued command
    pub seq: u64,
}

impl Playback {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            status: PlaybackStatus::Stopped,
            current: None,
            position_seconds: 0.,
            anchor: None,
            effective_at: None,
            seq: 0,
        }
    }

    /// Returns the authoritative position at `now`
    pub fn position_at(&self, now: Timestamp) -> f64 {
        let pending = self.effective_at.is_some_and(|at| now < at);

        match (self.status, self.anchor) {
            (PlaybackStatus::Playing, Some(anchor)) if !pending => {
                millis_to_seconds(now - anchor).max(0.)
            }
            _ => self.position_seconds,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// Makes `entry` current and starts it from the beginning
    pub fn load(&mut self, entry: QueueEntry, timing: Timing) -> PlaybackCommand {
        self.current = Some(entry);
        self.run_from(0., timing);
        self.command(PlaybackAction::Play, Some(0.), timing)
    }

    /// Starts or resumes the current entry, optionally from `position`
    pub fn play(&mut self, position: Option<f64>, timing: Timing) -> Result<PlaybackCommand, RoomError> {
        self.ensure_current()?;

        let position = match position {
            Some(p) => self.validate_position(p)?,
            None => match self.status {
                PlaybackStatus::Stopped => 0.,
                PlaybackStatus::Paused => self.position_seconds,
                PlaybackStatus::Playing => self.position_at(timing.issued_at),
            },
        };

        self.run_from(position, timing);
        Ok(self.command(PlaybackAction::Play, Some(position), timing))
    }

    /// Freezes the current entry at the position it has at issue time, or at `position`
    pub fn pause(&mut self, position: Option<f64>, timing: Timing) -> Result<PlaybackCommand, RoomError> {
        self.ensure_current()?;

        let position = match position {
            Some(p) => self.validate_position(p)?,
            None => self.position_at(timing.issued_at),
        };

        self.status = PlaybackStatus::Paused;
        self.position_seconds = position;
        self.anchor = None;
        self.effective_at = Some(timing.scheduled_at);

        Ok(self.command(PlaybackAction::Pause, Some(position), timing))
    }

    /// Moves the current entry to `position` without changing the status
    pub fn seek(&mut self, position: f64, timing: Timing) -> Result<PlaybackCommand, RoomError> {
        self.ensure_current()?;

        if self.status == PlaybackStatus::Stopped {
            return Err(RoomError::NothingPlaying);
        }

        let position = self.validate_position(position)?;

        if self.is_playing() {
            self.run_from(position, timing);
        } else {
            self.position_seconds = position;
            self.effective_at = Some(timing.scheduled_at);
        }

        Ok(self.command(PlaybackAction::Seek, Some(position), timing))
    }

    /// Stops playback, returning the entry that was current
    pub fn stop(&mut self, timing: Timing) -> (Option<QueueEntry>, PlaybackCommand) {
        self.status = PlaybackStatus::Stopped;
        self.position_seconds = 0.;
        self.anchor = None;
        self.effective_at = Some(timing.scheduled_at);

        // Still names the entry being stopped
        let command = self.command(PlaybackAction::Stop, None, timing);
        let previous = self.current.take();

        (previous, command)
    }

    fn run_from(&mut self, position: f64, timing: Timing) {
        self.status = PlaybackStatus::Playing;
        self.position_seconds = position;
        self.anchor = Some(timing.scheduled_at - seconds_to_millis(position));
        self.effective_at = Some(timing.scheduled_at);
    }

    fn ensure_current(&self) -> Result<&QueueEntry, RoomError> {
        self.current.as_ref().ok_or(RoomError::NothingPlaying)
    }

    fn validate_position(&self, position: f64) -> Result<f64, RoomError> {
        let beyond_end = self
            .current
            .as_ref()
            .and_then(|c| c.duration_seconds)
            .is_some_and(|d| position > d);

        if !position.is_finite() || position < 0. || beyond_end {
            return Err(RoomError::InvalidSeekPosition(position));
        }

        Ok(position)
    }

    fn command(&mut self, action: PlaybackAction, position: Option<f64>, timing: Timing) -> PlaybackCommand {
        self.seq += 1;

        let current = self.current.as_ref();

        PlaybackCommand {
            room_id: self.room_id,
            seq: self.seq,
            action,
            status: self.status,
            entry_id: current.map(|c| c.id),
            media_ref: current.map(|c| c.media_ref.clone()),
            title: current.map(|c| c.title.clone()),
            seek_position_seconds: position,
            scheduled_execution_timestamp: timing.scheduled_at,
            issued_at: timing.issued_at,
        }
    }
}
