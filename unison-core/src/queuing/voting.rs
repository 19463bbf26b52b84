use serde::{Deserialize, Serialize};

use crate::EntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteType {
    Upvote,
    Skip,
}

/// The vote counts of an entry after a vote was cast or withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub entry_id: EntryId,
    pub upvotes: usize,
    pub skip_votes: usize,
}

/// Remembers which entry already triggered an automatic skip, so that a
/// threshold crossing only ever causes a single skip.
#[derive(Debug, Default, Clone)]
pub struct SkipLatch {
    fired_for: Option<EntryId>,
}

impl SkipLatch {
    /// Returns true exactly once for an entry, the first time its skip votes
    /// reach `threshold` of the online participants.
    pub fn evaluate(
        &mut self,
        entry_id: EntryId,
        skip_votes: usize,
        online: usize,
        threshold: f64,
    ) -> bool {
        if online == 0 || skip_votes == 0 || self.fired_for == Some(entry_id) {
            return false;
        }

        let ratio = skip_votes as f64 / online as f64;

        if ratio >= threshold {
            self.fired_for = Some(entry_id);
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_entry() {
        let mut latch = SkipLatch::default();

        assert!(!latch.evaluate(1, 1, 4, 0.5));
        assert!(latch.evaluate(1, 2, 4, 0.5));
        assert!(!latch.evaluate(1, 3, 4, 0.5));
        assert!(latch.evaluate(2, 2, 4, 0.5));
    }

    #[test]
    fn never_fires_without_online_participants() {
        let mut latch = SkipLatch::default();

        assert!(!latch.evaluate(1, 3, 0, 0.5));
        assert!(!latch.evaluate(1, 0, 4, 0.0));
    }

    #[test]
    fn vote_type_wire_names() {
        assert_eq!(serde_json::to_string(&VoteType::Skip).unwrap(), "\"SKIP\"");
        assert_eq!(
            serde_json::from_str::<VoteType>("\"UPVOTE\"").unwrap(),
            VoteType::Upvote
        );
    }
}
