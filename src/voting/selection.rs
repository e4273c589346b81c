use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::{
    ballot::PositionVote,
    election::{CandidateId, PositionId},
};
use crate::voting::catalog::BallotCatalog;

/// One position's entry in a voter's in-progress selections.
///
/// Invariants: `candidate_ids` holds no duplicates and never exceeds the
/// position's `max_selections`; `abstain` implies `candidate_ids` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionSelection {
    candidate_ids: Vec<CandidateId>,
    abstain: bool,
}

impl PositionSelection {
    /// Selected candidates, oldest first.
    pub fn candidate_ids(&self) -> &[CandidateId] {
        &self.candidate_ids
    }

    pub fn is_abstaining(&self) -> bool {
        self.abstain
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Position {0} is not on this ballot")]
    UnknownPosition(PositionId),
    #[error("Candidate '{candidate_id}' does not stand for position {position_id}")]
    UnknownCandidate {
        position_id: PositionId,
        candidate_id: CandidateId,
    },
    #[error("Abstaining is not allowed in this election")]
    AbstainNotAllowed,
}

/// A voter's in-progress choices, one entry per touched position.
///
/// All mutations are checked against the catalog, so the invariants of
/// [`PositionSelection`] hold after any sequence of calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PositionVote>", into = "Vec<PositionVote>")]
pub struct SelectionState {
    entries: BTreeMap<PositionId, PositionSelection>,
}

impl SelectionState {
    /// Get the entry for a position, if the voter has touched it.
    pub fn entry(&self, position_id: PositionId) -> Option<&PositionSelection> {
        self.entries.get(&position_id)
    }

    /// Has the voter recorded nothing at all?
    pub fn is_empty(&self) -> bool {
        self.entries
            .values()
            .all(|e| e.candidate_ids.is_empty() && !e.abstain)
    }

    /// Toggle a candidate.
    ///
    /// Selecting an already-selected candidate removes it. Otherwise, if the
    /// position is full, the earliest-selected candidate is evicted to make
    /// room, so on a single-choice position the latest choice always wins.
    /// Selecting clears any abstention on the position.
    pub fn select(
        &mut self,
        catalog: &BallotCatalog,
        position_id: PositionId,
        candidate_id: &str,
    ) -> Result<(), SelectionError> {
        let position = catalog
            .position(position_id)
            .ok_or(SelectionError::UnknownPosition(position_id))?;
        if position.candidate(candidate_id).is_none() {
            return Err(SelectionError::UnknownCandidate {
                position_id,
                candidate_id: candidate_id.to_string(),
            });
        }

        let entry = self.entries.entry(position_id).or_default();
        entry.abstain = false;
        if let Some(index) = entry.candidate_ids.iter().position(|c| c == candidate_id) {
            entry.candidate_ids.remove(index);
            return Ok(());
        }
        let max = position.max_selections.max(1) as usize;
        while entry.candidate_ids.len() >= max {
            entry.candidate_ids.remove(0);
        }
        entry.candidate_ids.push(candidate_id.to_string());
        Ok(())
    }

    /// Toggle abstention for a position, returning the new abstention flag.
    /// Turning abstention on clears the position's selected candidates.
    pub fn abstain(
        &mut self,
        catalog: &BallotCatalog,
        position_id: PositionId,
    ) -> Result<bool, SelectionError> {
        if catalog.position(position_id).is_none() {
            return Err(SelectionError::UnknownPosition(position_id));
        }
        let abstaining = self.entries.get(&position_id).map_or(false, |e| e.abstain);
        if !abstaining && !catalog.allow_abstain {
            return Err(SelectionError::AbstainNotAllowed);
        }
        let entry = self.entries.entry(position_id).or_default();
        entry.abstain = !entry.abstain;
        if entry.abstain {
            entry.candidate_ids.clear();
        }
        Ok(entry.abstain)
    }

    /// The selections as ballot entries, ordered by position ID.
    pub fn votes(&self) -> Vec<PositionVote> {
        self.clone().into()
    }
}

impl From<Vec<PositionVote>> for SelectionState {
    fn from(votes: Vec<PositionVote>) -> Self {
        let entries = votes
            .into_iter()
            .map(|vote| {
                let mut candidate_ids: Vec<CandidateId> = Vec::new();
                if !vote.abstain {
                    for candidate_id in vote.candidate_ids {
                        if !candidate_ids.contains(&candidate_id) {
                            candidate_ids.push(candidate_id);
                        }
                    }
                }
                let selection = PositionSelection {
                    candidate_ids,
                    abstain: vote.abstain,
                };
                (vote.position_id, selection)
            })
            .collect();
        Self { entries }
    }
}

impl From<SelectionState> for Vec<PositionVote> {
    fn from(state: SelectionState) -> Self {
        state
            .entries
            .into_iter()
            .map(|(position_id, selection)| PositionVote {
                position_id,
                candidate_ids: selection.candidate_ids,
                abstain: selection.abstain,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::db::election::Election;

    fn catalog() -> BallotCatalog {
        BallotCatalog::from_election(&Election::active_example())
    }

    fn selected(state: &SelectionState, position_id: PositionId) -> Vec<&str> {
        state
            .entry(position_id)
            .map(|e| e.candidate_ids().iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn single_choice_keeps_latest() {
        let catalog = catalog();
        let mut state = SelectionState::default();
        state.select(&catalog, 1, "alice").unwrap();
        state.select(&catalog, 1, "bob").unwrap();
        assert_eq!(selected(&state, 1), vec!["bob"]);
    }

    #[test]
    fn multi_choice_evicts_oldest() {
        let catalog = catalog();
        let mut state = SelectionState::default();
        state.select(&catalog, 2, "dave").unwrap();
        state.select(&catalog, 2, "erin").unwrap();
        state.select(&catalog, 2, "frank").unwrap();
        assert_eq!(selected(&state, 2), vec!["erin", "frank"]);
    }

    #[test]
    fn selecting_twice_toggles_off() {
        let catalog = catalog();
        let mut state = SelectionState::default();
        state.select(&catalog, 2, "dave").unwrap();
        state.select(&catalog, 2, "erin").unwrap();
        state.select(&catalog, 2, "dave").unwrap();
        assert_eq!(selected(&state, 2), vec!["erin"]);
        assert!(!state.is_empty());
        state.select(&catalog, 2, "erin").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn abstain_clears_and_select_clears_abstain() {
        let catalog = catalog();
        let mut state = SelectionState::default();
        state.select(&catalog, 2, "dave").unwrap();
        assert_eq!(state.abstain(&catalog, 2), Ok(true));
        assert!(state.entry(2).unwrap().is_abstaining());
        assert!(selected(&state, 2).is_empty());

        state.select(&catalog, 2, "grace").unwrap();
        assert!(!state.entry(2).unwrap().is_abstaining());
        assert_eq!(selected(&state, 2), vec!["grace"]);

        // Toggling twice leaves the position untouched but not abstaining.
        assert_eq!(state.abstain(&catalog, 1), Ok(true));
        assert_eq!(state.abstain(&catalog, 1), Ok(false));
        assert!(!state.entry(1).unwrap().is_abstaining());
    }

    #[test]
    fn abstain_requires_election_permission() {
        let catalog = BallotCatalog::from_election(&Election::strict_example());
        let mut state = SelectionState::default();
        assert_eq!(
            state.abstain(&catalog, 1),
            Err(SelectionError::AbstainNotAllowed)
        );
        assert!(state.entry(1).is_none());
    }

    #[test]
    fn rejects_unknown_positions_and_candidates() {
        let catalog = catalog();
        let mut state = SelectionState::default();
        assert_eq!(
            state.select(&catalog, 9, "alice"),
            Err(SelectionError::UnknownPosition(9))
        );
        assert_eq!(
            state.select(&catalog, 1, "dave"),
            Err(SelectionError::UnknownCandidate {
                position_id: 1,
                candidate_id: "dave".to_string()
            })
        );
        assert_eq!(state.abstain(&catalog, 9), Err(SelectionError::UnknownPosition(9)));
        assert!(state.is_empty());
    }

    #[test]
    fn bounds_hold_under_arbitrary_sequences() {
        let catalog = catalog();
        let mut state = SelectionState::default();
        let candidates = ["dave", "erin", "frank", "grace"];
        // A deterministic pseudo-random walk over selects and abstains.
        let mut seed: u32 = 7;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let pick = (seed >> 16) as usize % (candidates.len() + 1);
            if pick == candidates.len() {
                state.abstain(&catalog, 2).unwrap();
            } else {
                state.select(&catalog, 2, candidates[pick]).unwrap();
            }
            let entry = state.entry(2).unwrap();
            assert!(entry.candidate_ids().len() <= 2);
            if entry.is_abstaining() {
                assert!(entry.candidate_ids().is_empty());
            }
            let mut unique = entry.candidate_ids().to_vec();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), entry.candidate_ids().len());
        }
    }

    #[test]
    fn converts_to_ordered_votes() {
        let catalog = catalog();
        let mut state = SelectionState::default();
        state.select(&catalog, 2, "erin").unwrap();
        state.abstain(&catalog, 1).unwrap();
        let votes = state.votes();
        assert_eq!(
            votes,
            vec![
                PositionVote::abstention(1),
                PositionVote::for_candidates(2, ["erin"]),
            ]
        );
        assert_eq!(SelectionState::from(votes), state);
    }
}
