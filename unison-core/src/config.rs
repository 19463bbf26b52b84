use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{seconds_to_millis, RoomError, Timestamp};

/// Runtime configuration shared by room actors and clients
#[derive(Debug, Clone)]
pub struct Config {
    /// How far in the future commands are scheduled, masking delivery jitter
    pub sync_buffer_ms: i64,
    /// How often clients are expected to heartbeat
    pub heartbeat_interval_ms: u64,
    /// How many heartbeat intervals may pass before a participant is considered offline
    pub offline_after_missed_heartbeats: u32,
    /// The first reconnection delay, doubled on each failed attempt
    pub reconnect_base_delay_ms: u64,
    /// The upper bound for the reconnection delay
    pub reconnect_max_delay_ms: u64,
    /// Gives up reconnecting after this many attempts, if set
    pub reconnect_max_attempts: Option<u32>,
    /// Capacity of the per-room broadcast and command channels
    pub channel_capacity: usize,
}

impl Config {
    /// Returns the instant all clients should apply a command issued at `issued_at`
    pub fn scheduled_from(&self, issued_at: Timestamp) -> Timestamp {
        issued_at + self.sync_buffer_ms
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// How long a participant may stay silent before going offline
    pub fn offline_timeout_ms(&self) -> i64 {
        (self.heartbeat_interval_ms * self.offline_after_missed_heartbeats as u64) as i64
    }

    /// The un-jittered delay before reconnection attempt `attempt` (starting at 0)
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay = self.reconnect_base_delay_ms.saturating_mul(factor);

        Duration::from_millis(delay.min(self.reconnect_max_delay_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Enough for most clients to receive a command before it fires
            sync_buffer_ms: 2000,
            heartbeat_interval_ms: 30_000,
            offline_after_missed_heartbeats: 2,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            reconnect_max_attempts: None,
            channel_capacity: 256,
        }
    }
}

/// Per-room submission policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    pub max_queue_size: Option<usize>,
    pub max_entries_per_user: Option<usize>,
    pub min_duration_seconds: Option<f64>,
    pub max_duration_seconds: Option<f64>,
    pub allow_duplicates: bool,
    /// Listeners may add entries, not just moderators and leaders
    pub listener_submissions: bool,
    /// Canonical media references that may never be queued
    pub banned_media: Vec<String>,
    /// How long media that finished playing is refused again
    pub cooldown_hours: Option<f64>,
}

impl RoomSettings {
    pub fn check_duration(&self, duration_seconds: Option<f64>) -> Result<(), RoomError> {
        let Some(duration) = duration_seconds else {
            return Ok(());
        };

        let too_short = self.min_duration_seconds.is_some_and(|min| duration < min);
        let too_long = self.max_duration_seconds.is_some_and(|max| duration > max);

        if !duration.is_finite() || duration < 0. || too_short || too_long {
            return Err(RoomError::DurationOutOfRange(duration));
        }

        Ok(())
    }

    pub fn is_queue_full(&self, queue_size: usize) -> bool {
        self.max_queue_size.is_some_and(|max| queue_size >= max)
    }

    pub fn can_user_add_more(&self, queued_by_user: usize) -> bool {
        self.max_entries_per_user
            .map_or(true, |max| queued_by_user < max)
    }

    pub fn is_banned(&self, canonical_media: &str) -> bool {
        self.banned_media.iter().any(|m| m == canonical_media)
    }

    /// Whether media that finished at `finished_at` may not be queued again at `now`
    pub fn is_cooling_down(&self, finished_at: Timestamp, now: Timestamp) -> bool {
        self.cooldown_hours
            .filter(|hours| *hours > 0.)
            .is_some_and(|hours| now - finished_at < seconds_to_millis(hours * 3600.))
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_queue_size: Some(50),
            max_entries_per_user: Some(5),
            min_duration_seconds: Some(60.),
            max_duration_seconds: Some(900.),
            allow_duplicates: false,
            listener_submissions: true,
            banned_media: vec![],
            cooldown_hours: None,
        }
    }
}
