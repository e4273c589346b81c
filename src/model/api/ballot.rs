use serde::{Deserialize, Serialize};

use crate::model::{
    api::{id::ApiId, receipt::VoteReceipt},
    common::{ballot::PositionVote, election::ElectionId},
};

/// A complete ballot submitted for validation or casting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub session_id: ApiId,
    pub election_id: ElectionId,
    /// One entry per position of the election.
    pub votes: Vec<PositionVote>,
    /// Opaque client device fingerprint, passed through to the sealing service.
    #[serde(default)]
    pub device_fingerprint: String,
}

/// The outcome of server-side ballot validation. `errors` is exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Response to a successful cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastResponse {
    pub receipt: VoteReceipt,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Ballot {
        /// A valid ballot for `Election::active_example()`.
        pub fn example(session_id: impl Into<ApiId>) -> Self {
            Self {
                session_id: session_id.into(),
                election_id: 1,
                votes: vec![
                    PositionVote::for_candidates(1, ["alice"]),
                    PositionVote::for_candidates(2, ["dave", "grace"]),
                ],
                device_fingerprint: "test-device".to_string(),
            }
        }
    }
}
