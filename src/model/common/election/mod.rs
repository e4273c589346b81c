mod position;
mod state;

pub use position::{Candidate, Position};
pub use state::ElectionState;

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our position IDs are integers, unique within an election.
pub type PositionId = u32;
/// Our candidate IDs are strings, unique within a position.
pub type CandidateId = String;
/// Voter IDs are opaque strings supplied by the authentication service.
pub type VoterId = String;
