use tokio::time::Instant;
use unison_core::{Clock, SystemClock, Timestamp};

/// A wall clock that advances with tokio's timer.
///
/// It reads the system time once, then follows the tokio clock, so the
/// instants the executor sleeps until and the timestamps it compares against
/// never disagree. With a paused runtime it moves only when tokio time does.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    epoch: Timestamp,
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now())
    }

    pub fn starting_at(epoch: Timestamp) -> Self {
        Self {
            epoch,
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        self.epoch + self.origin.elapsed().as_millis() as Timestamp
    }
}
