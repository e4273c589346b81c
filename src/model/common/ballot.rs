use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, PositionId};

/// A voter's choice for a single position, as carried by ballots, draft
/// selections and sealed votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionVote {
    pub position_id: PositionId,
    /// Selected candidates, in the order they were chosen.
    #[serde(default)]
    pub candidate_ids: Vec<CandidateId>,
    /// Explicit abstention. Implies `candidate_ids` is empty.
    #[serde(default)]
    pub abstain: bool,
}

impl PositionVote {
    /// An explicit abstention for the given position.
    pub fn abstention(position_id: PositionId) -> Self {
        Self {
            position_id,
            candidate_ids: Vec::new(),
            abstain: true,
        }
    }

    /// A vote for the given candidates.
    pub fn for_candidates<I, C>(position_id: PositionId, candidates: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CandidateId>,
    {
        Self {
            position_id,
            candidate_ids: candidates.into_iter().map(Into::into).collect(),
            abstain: false,
        }
    }
}
