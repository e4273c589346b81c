use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::{
        ballot::PositionVote,
        election::{CandidateId, ElectionId, PositionId},
        session::SessionStatus,
    },
    db::session::VotingSession,
};
use crate::voting::{catalog::BallotCatalog, validator};

/// Request to start (or resume) a voting session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub election_id: ElectionId,
}

/// Response to a session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: ApiId,
    pub expires_at: DateTime<Utc>,
}

impl From<&VotingSession> for SessionStarted {
    fn from(session: &VotingSession) -> Self {
        Self {
            session_id: session.id.into(),
            expires_at: session.expires_at,
        }
    }
}

/// Toggle a candidate for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    pub position_id: PositionId,
    pub candidate_id: CandidateId,
}

/// Toggle abstention for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstainRequest {
    pub position_id: PositionId,
}

/// A voter's view of their session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: ApiId,
    pub election_id: ElectionId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub selections: Vec<PositionVote>,
    /// Positions whose current selection lets the voter move on.
    pub can_advance: Vec<PositionId>,
}

impl SessionView {
    pub fn new(session: &VotingSession, catalog: &BallotCatalog) -> Self {
        let can_advance = catalog
            .positions
            .iter()
            .filter(|position| {
                validator::can_advance(position, session.selections.entry(position.id))
            })
            .map(|position| position.id)
            .collect();
        Self {
            session_id: session.id.into(),
            election_id: session.election_id,
            status: session.status,
            started_at: session.started_at,
            expires_at: session.expires_at,
            selections: session.selections.votes(),
            can_advance,
        }
    }
}
