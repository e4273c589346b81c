use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionState {
    /// Under construction, not visible to voters.
    Draft,
    /// Published and (within its time window) accepting votes.
    /// Results are preliminary.
    Active,
    /// Voting has closed; the set of vote records is frozen and results are final.
    Completed,
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}
