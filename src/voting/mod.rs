pub mod buffer;
pub mod tally;

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use buffer::MessageBuffer;
pub use tally::tally;

/// Running vote total for one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub option: String,
    pub votes: u64,
}

/// Running totals for the round, kept in configured option order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteState {
    counts: Vec<VoteCount>,
}

impl VoteState {
    pub fn new(options: &[String]) -> Self {
        Self {
            counts: options
                .iter()
                .map(|option| VoteCount { option: option.clone(), votes: 0 })
                .collect(),
        }
    }

    /// Adds a tally delta onto the totals. Keys outside the round are skipped.
    pub fn apply(&mut self, delta: &HashMap<String, u64>) {
        for (option, votes) in delta {
            match self.counts.iter_mut().find(|c| &c.option == option) {
                Some(count) => count.votes += votes,
                None => debug!("Ignoring {} vote(s) for inactive option {}", votes, option),
            }
        }
    }

    /// Option with the strictly greatest total. Ties go to whichever comes
    /// first in configured order; no votes at all means no winner.
    pub fn winner(&self) -> Option<&str> {
        let mut best: Option<&VoteCount> = None;
        for count in &self.counts {
            if count.votes == 0 {
                continue;
            }
            if best.is_none_or(|b| count.votes > b.votes) {
                best = Some(count);
            }
        }
        best.map(|c| c.option.as_str())
    }

    pub fn get(&self, option: &str) -> Option<u64> {
        self.counts.iter().find(|c| c.option == option).map(|c| c.votes)
    }

    pub fn counts(&self) -> &[VoteCount] {
        &self.counts
    }

    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.counts.iter().map(|c| c.option.as_str())
    }

    pub fn total_votes(&self) -> u64 {
        self.counts.iter().map(|c| c.votes).sum()
    }

    pub fn max_votes(&self) -> u64 {
        self.counts.iter().map(|c| c.votes).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;

    fn options(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn delta(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn all_zero_has_no_winner() {
        let state = VoteState::new(&options(&["a", "b", "c"]));
        assert_eq!(state.winner(), None);
        assert_eq!(state.total_votes(), 0);
    }

    #[test]
    fn tie_goes_to_first_in_configured_order() {
        let mut state = VoteState::new(&options(&["a", "b", "c"]));
        state.apply(&delta(&[("a", 3), ("b", 5), ("c", 5)]));
        assert_eq!(state.winner(), Some("b"));
    }

    #[test]
    fn apply_accumulates_and_skips_unknown_options() {
        let mut state = VoteState::new(&options(&["a", "b"]));
        state.apply(&delta(&[("a", 2)]));
        state.apply(&delta(&[("a", 1), ("b", 4), ("zzz", 9)]));
        assert_eq!(state.get("a"), Some(3));
        assert_eq!(state.get("b"), Some(4));
        assert_eq!(state.get("zzz"), None);
        assert_eq!(state.total_votes(), 7);
        assert_eq!(state.max_votes(), 4);
    }

    #[test]
    fn split_batches_match_single_pass() {
        let active = options(&["1", "2", "3"]);
        let first: Vec<ChatMessage> = ["1", "1 and 2", "nope"].iter().map(|t| ChatMessage::new("u", *t)).collect();
        let second: Vec<ChatMessage> = ["3!", "2 2 2", "123"].iter().map(|t| ChatMessage::new("u", *t)).collect();

        let mut split = VoteState::new(&active);
        split.apply(&tally(&first, &active));
        split.apply(&tally(&second, &active));

        let mut joined = VoteState::new(&active);
        let all: Vec<ChatMessage> = first.into_iter().chain(second).collect();
        joined.apply(&tally(&all, &active));

        assert_eq!(split, joined);
    }

    #[test]
    fn end_to_end_round() {
        let active = options(&["a", "b", "c"]);
        let batch: Vec<ChatMessage> = ["vote a", "go b!", "a all the way"]
            .iter()
            .map(|t| ChatMessage::new("viewer", *t))
            .collect();

        let delta = tally(&batch, &active);
        assert_eq!(delta, self::delta(&[("a", 2), ("b", 1)]));

        let mut state = VoteState::new(&active);
        state.apply(&delta);
        let totals: Vec<(&str, u64)> = state.counts().iter().map(|c| (c.option.as_str(), c.votes)).collect();
        assert_eq!(totals, vec![("a", 2), ("b", 1), ("c", 0)]);
        assert_eq!(state.winner(), Some("a"));
    }
}
