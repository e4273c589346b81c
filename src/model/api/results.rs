use serde::{Deserialize, Serialize};

use crate::model::{
    api::receipt::PublishedVote,
    common::election::{CandidateId, ElectionId, PositionId},
};
use crate::voting::catalog::BallotCatalog;

/// The per-candidate line of a position's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub candidate_id: CandidateId,
    pub vote_count: u64,
    /// Share of the position's `total_votes`, in percent.
    pub percentage: f64,
    /// 1-based competition rank: tied candidates share a rank.
    pub rank: u32,
}

/// Identifies the position a result belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSummary {
    pub id: PositionId,
    pub name: String,
    pub order: u32,
    pub max_selections: u32,
}

/// Results for a single position.
///
/// For positions with `max_selections > 1` every selected candidate receives
/// one vote per ballot, so `total_votes` (and the sum of `vote_count`) may
/// exceed `ballots`. Percentages are relative to `total_votes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResult {
    pub position: PositionSummary,
    /// Ordered by vote count descending, then candidate listing order.
    pub results: Vec<CandidateResult>,
    /// Set only when a single candidate strictly leads.
    pub winner: Option<CandidateId>,
    /// Candidates sharing first place when there is no strict winner.
    pub tied_for_first: Vec<CandidateId>,
    /// Sum of candidate vote counts. Abstentions are excluded.
    pub total_votes: u64,
    pub abstained_votes: u64,
    /// Ballots that carried an entry for this position, abstentions included.
    pub ballots: u64,
}

/// Results for a whole election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: ElectionId,
    /// False while the election is still running and results are preliminary.
    #[serde(rename = "final")]
    pub is_final: bool,
    pub position_results: Vec<PositionResult>,
    /// Distinct voters with a committed vote.
    pub total_votes: u64,
    pub total_eligible_voters: u32,
    pub turnout_percentage: f64,
}

/// Everything needed to independently verify a completed election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsDump {
    pub catalog: BallotCatalog,
    pub eligible_voters: u32,
    pub votes: Vec<PublishedVote>,
    pub results: ElectionResults,
}
