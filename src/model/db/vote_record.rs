use chrono::{DateTime, SubsecRound, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        ballot::PositionVote,
        election::{ElectionId, VoterId},
    },
    mongodb::Id,
};

/// Vote content as returned by the sealing service: the canonical selections
/// bound to their election and session by an opaque seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedVote {
    pub election_id: ElectionId,
    pub session_id: Id,
    /// One entry per position, ordered by position ID.
    pub content: Vec<PositionVote>,
    /// Seal over the above, hex encoded.
    pub seal: String,
}

impl SealedVote {
    /// Canonical byte encoding of vote content, as sealed and hashed.
    pub fn canonical_content(content: &[PositionVote]) -> Vec<u8> {
        serde_json::to_vec(content).expect("Serialisation is infallible")
    }
}

/// An immutable, committed vote. Created exactly once per session and never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Uniquely indexed: a session commits at most one record.
    pub session_id: Id,
    pub election_id: ElectionId,
    pub voter_id: VoterId,
    pub sealed: SealedVote,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl VoteRecord {
    /// Create a record for the given sealed vote, cast now.
    pub fn new(voter_id: impl Into<VoterId>, sealed: SealedVote) -> Self {
        Self {
            id: Id::new(),
            session_id: sealed.session_id,
            election_id: sealed.election_id,
            voter_id: voter_id.into(),
            sealed,
            cast_at: Utc::now().trunc_subsecs(3),
        }
    }
}
