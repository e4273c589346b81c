use chrono::{DateTime, Duration, SubsecRound, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        election::{ElectionId, VoterId},
        session::SessionStatus,
    },
    mongodb::Id,
};
use crate::voting::selection::SelectionState;

/// A time-boxed voting session for one voter in one election, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingSession {
    #[serde(rename = "_id")]
    pub id: Id,
    pub election_id: ElectionId,
    pub voter_id: VoterId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Mirrors `status.holds_voter_slot()`, so that a partial unique index can
    /// enforce one live session per voter and election.
    holds_slot: bool,
    /// Draft selections recorded so far.
    #[serde(default)]
    pub selections: SelectionState,
}

impl VotingSession {
    /// Create a fresh active session starting now.
    pub fn new(election_id: ElectionId, voter_id: impl Into<VoterId>, ttl: Duration) -> Self {
        // The database stores millisecond precision; truncate now so that
        // reads and writes agree.
        let started_at = Utc::now().trunc_subsecs(3);
        Self {
            id: Id::new(),
            election_id,
            voter_id: voter_id.into(),
            started_at,
            expires_at: started_at + ttl,
            status: SessionStatus::Active,
            holds_slot: true,
            selections: SelectionState::default(),
        }
    }

    /// Set the status, keeping the voter slot marker in step.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.holds_slot = status.holds_voter_slot();
    }

    /// Does this session occupy the voter's slot for its election?
    pub fn holds_slot(&self) -> bool {
        self.holds_slot
    }

    /// Has the TTL elapsed at `now`?
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Is the session open for selections and submission at `now`?
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired_at(now)
    }
}
