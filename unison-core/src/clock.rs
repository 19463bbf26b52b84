use std::sync::Arc;

use chrono::Utc;
use crossbeam::atomic::AtomicCell;

/// Wall-clock milliseconds since the unix epoch.
pub type Timestamp = i64;

/// A source of wall-clock time.
///
/// Scheduled execution assumes roughly synchronized clocks between the room
/// and its clients, so everything is expressed in epoch milliseconds rather
/// than monotonic instants.
pub trait Clock
where
    Self: Send + Sync + 'static,
{
    fn now(&self) -> Timestamp;
}

pub type SharedClock = Arc<dyn Clock>;

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicCell<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicCell::new(start),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis);
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load()
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock,
{
    fn now(&self) -> Timestamp {
        self.as_ref().now()
    }
}

/// Converts a span in milliseconds to seconds.
pub fn millis_to_seconds(millis: i64) -> f64 {
    millis as f64 / 1000.
}

/// Converts seconds to whole milliseconds.
pub fn seconds_to_millis(seconds: f64) -> i64 {
    (seconds * 1000.).round() as i64
}
