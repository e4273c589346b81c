use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the voting session lifecycle.
///
/// `Active` is the only state with outgoing transitions besides `Committing`.
/// `Completed`, `Expired` and `Abandoned` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Open for selections and submission until `expires_at`.
    Active,
    /// A submission has claimed the session and is sealing/committing the vote.
    Committing,
    /// A vote record was committed for this session.
    Completed,
    /// The TTL elapsed without a submission.
    Expired,
    /// The TTL elapsed and the voter never recorded a selection.
    Abandoned,
}

impl SessionStatus {
    /// Does a session in this state occupy the voter's single slot for the election?
    /// At most one such session may exist per (voter, election).
    pub fn holds_voter_slot(self) -> bool {
        matches!(self, Self::Active | Self::Committing | Self::Completed)
    }

    /// Is this state terminal?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Abandoned)
    }

    /// Is `self -> next` a legal transition?
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Active, Committing)
                | (Active, Completed)
                | (Active, Expired)
                | (Active, Abandoned)
                | (Committing, Active)
                | (Committing, Completed)
                | (Committing, Expired)
                | (Committing, Abandoned)
        )
    }
}

impl From<SessionStatus> for Bson {
    fn from(status: SessionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
