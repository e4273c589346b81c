use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::election::{ElectionId, ElectionState, Position};

/// An election from the database. Elections, their positions and candidates
/// are provisioned externally; this service only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    /// Election name.
    pub name: String,
    /// Election state.
    pub state: ElectionState,
    /// Voting opens at this time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting closes at this time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// May voters explicitly abstain on a position?
    #[serde(default)]
    pub allow_abstain: bool,
    /// Size of the electorate, the turnout denominator.
    pub eligible_voters: u32,
    /// The contested positions.
    pub positions: Vec<Position>,
}

impl Election {
    /// Is the election inside an active voting window at `now`?
    pub fn is_open_for_voting(&self, now: DateTime<Utc>) -> bool {
        self.state == ElectionState::Active && self.start_time <= now && now < self.end_time
    }

    /// Do results exist for this election? Preliminary while active, final once completed.
    pub fn has_results(&self) -> bool {
        matches!(self.state, ElectionState::Active | ElectionState::Completed)
    }
}
