use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{EntryId, MediaRef, RoomId, Timestamp, UserId};

use super::{VoteTally, VoteType};

/// A submitted media item, waiting in the queue or currently playing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "QueueEntryRecord", from = "QueueEntryRecord")]
pub struct QueueEntry {
    pub id: EntryId,
    pub room_id: RoomId,
    pub submitted_by: UserId,
    pub media_ref: MediaRef,
    pub title: String,
    pub duration_seconds: Option<f64>,
    /// Sort key within the queue, lower plays first
    pub position: i64,
    pub created_at: Timestamp,

    upvoters: BTreeSet<UserId>,
    skip_voters: BTreeSet<UserId>,
}

/// The data needed to create a [QueueEntry], before it has been assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueEntry {
    pub room_id: RoomId,
    pub submitted_by: UserId,
    pub media_ref: MediaRef,
    pub title: String,
    pub duration_seconds: Option<f64>,
    pub position: i64,
    pub created_at: Timestamp,
}

impl NewQueueEntry {
    pub fn with_id(self, id: EntryId) -> QueueEntry {
        QueueEntry {
            id,
            room_id: self.room_id,
            submitted_by: self.submitted_by,
            media_ref: self.media_ref,
            title: self.title,
            duration_seconds: self.duration_seconds,
            position: self.position,
            created_at: self.created_at,
            upvoters: Default::default(),
            skip_voters: Default::default(),
        }
    }
}

impl QueueEntry {
    /// Casts the vote, or withdraws it if the user already cast the same one.
    /// Returns true if the vote is now cast.
    pub fn toggle_vote(&mut self, user_id: UserId, vote_type: VoteType) -> bool {
        let voters = match vote_type {
            VoteType::Upvote => &mut self.upvoters,
            VoteType::Skip => &mut self.skip_voters,
        };

        if voters.remove(&user_id) {
            false
        } else {
            voters.insert(user_id)
        }
    }

    pub fn has_voted(&self, user_id: UserId, vote_type: VoteType) -> bool {
        match vote_type {
            VoteType::Upvote => self.upvoters.contains(&user_id),
            VoteType::Skip => self.skip_voters.contains(&user_id),
        }
    }

    pub fn upvote_count(&self) -> usize {
        self.upvoters.len()
    }

    pub fn skip_vote_count(&self) -> usize {
        self.skip_voters.len()
    }

    /// Skip votes only count towards the entry while it is playing
    pub fn clear_skip_votes(&mut self) {
        self.skip_voters.clear();
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally {
            entry_id: self.id,
            upvotes: self.upvote_count(),
            skip_votes: self.skip_vote_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueEntryRecord {
    id: EntryId,
    room_id: RoomId,
    submitted_by: UserId,
    media_ref: MediaRef,
    title: String,
    duration_seconds: Option<f64>,
    position: i64,
    created_at: Timestamp,
    #[serde(default)]
    upvoters: Vec<UserId>,
    #[serde(default)]
    skip_voters: Vec<UserId>,
    #[serde(default)]
    upvote_count: usize,
    #[serde(default)]
    skip_vote_count: usize,
}

impl From<QueueEntry> for QueueEntryRecord {
    fn from(entry: QueueEntry) -> Self {
        Self {
            upvote_count: entry.upvote_count(),
            skip_vote_count: entry.skip_vote_count(),
            id: entry.id,
            room_id: entry.room_id,
            submitted_by: entry.submitted_by,
            media_ref: entry.media_ref,
            title: entry.title,
            duration_seconds: entry.duration_seconds,
            position: entry.position,
            created_at: entry.created_at,
            upvoters: entry.upvoters.into_iter().collect(),
            skip_voters: entry.skip_voters.into_iter().collect(),
        }
    }
}

impl From<QueueEntryRecord> for QueueEntry {
    fn from(record: QueueEntryRecord) -> Self {
        // Counts are derived from the voter lists and never trusted
        Self {
            id: record.id,
            room_id: record.room_id,
            submitted_by: record.submitted_by,
            media_ref: record.media_ref,
            title: record.title,
            duration_seconds: record.duration_seconds,
            position: record.position,
            created_at: record.created_at,
            upvoters: record.upvoters.into_iter().collect(),
            skip_voters: record.skip_voters.into_iter().collect(),
        }
    }
}

#[cfg(test)]
pub(crate) fn entry_for_test(id: EntryId, position: i64) -> QueueEntry {
    NewQueueEntry {
        room_id: 1,
        submitted_by: 1,
        media_ref: MediaRef::YouTube("z09GolEktUw".to_string()),
        title: format!("Entry {}", id),
        duration_seconds: Some(200.),
        position,
        created_at: 0,
    }
    .with_id(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_toggle_nets_zero() {
        let mut entry = entry_for_test(1, 10_000);

        assert!(entry.toggle_vote(7, VoteType::Upvote));
        assert_eq!(entry.upvote_count(), 1);
        assert!(!entry.toggle_vote(7, VoteType::Upvote));
        assert_eq!(entry.upvote_count(), 0);

        // Different vote types are independent
        entry.toggle_vote(7, VoteType::Upvote);
        entry.toggle_vote(7, VoteType::Skip);
        assert_eq!(entry.tally(), VoteTally {
            entry_id: 1,
            upvotes: 1,
            skip_votes: 1
        });
    }

    #[test]
    fn serialized_counts_follow_voters() {
        let mut entry = entry_for_test(1, 10_000);
        entry.toggle_vote(2, VoteType::Skip);
        entry.toggle_vote(3, VoteType::Skip);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["skipVoteCount"], 2);
        assert_eq!(json["mediaRef"], "youtube:z09GolEktUw");

        let mut tampered = json.clone();
        tampered["skipVoteCount"] = 99.into();
        let restored: QueueEntry = serde_json::from_value(tampered).unwrap();

        assert_eq!(restored.skip_vote_count(), 2);
        assert_eq!(restored, entry);
    }
}
