mod entry;
mod queue;
mod voting;

pub use entry::*;
pub use queue::*;
pub use voting::*;

use serde::{Deserialize, Serialize};

use crate::{Timestamp, UserId};

/// A record of an entry that stopped playing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayHistoryEntry {
    pub entry: QueueEntry,
    pub leader: Option<UserId>,
    pub was_skipped: bool,
    pub upvotes: usize,
    pub skip_votes: usize,
    pub participant_count: usize,
    pub finished_at: Timestamp,
}
