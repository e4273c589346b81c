use serde::{Deserialize, Serialize};

use super::{CandidateId, PositionId};

/// A contestable office or question within an election.
/// Positions are frozen once the election is activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Position ID, unique within the election.
    pub id: PositionId,
    /// Display name.
    pub name: String,
    /// Fewest candidates a voter must select, unless abstaining.
    pub min_selections: u32,
    /// Most candidates a voter may select. Always at least one.
    pub max_selections: u32,
    /// Display order, also used as the tie-break seed when ordering positions.
    pub order: u32,
    /// Eligible candidates, in listing order.
    pub candidates: Vec<Candidate>,
}

impl Position {
    /// Get the candidate with the given ID, if it stands for this position.
    pub fn candidate(&self, candidate_id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == candidate_id)
    }

    /// Listing index of the given candidate.
    pub fn candidate_index(&self, candidate_id: &str) -> Option<usize> {
        self.candidates.iter().position(|c| c.id == candidate_id)
    }
}

/// A candidate standing for exactly one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Position {
        /// A single-winner position with three candidates.
        pub fn chair_example() -> Self {
            Self {
                id: 1,
                name: "Chair".to_string(),
                min_selections: 1,
                max_selections: 1,
                order: 1,
                candidates: vec![
                    Candidate::example("alice", "Alice Archer"),
                    Candidate::example("bob", "Bob Baker"),
                    Candidate::example("carol", "Carol Cook"),
                ],
            }
        }

        /// A multi-select position where voters pick up to two of four.
        pub fn committee_example() -> Self {
            Self {
                id: 2,
                name: "Committee".to_string(),
                min_selections: 1,
                max_selections: 2,
                order: 2,
                candidates: vec![
                    Candidate::example("dave", "Dave Dyer"),
                    Candidate::example("erin", "Erin Evans"),
                    Candidate::example("frank", "Frank Fisher"),
                    Candidate::example("grace", "Grace Gill"),
                ],
            }
        }
    }

    impl Candidate {
        pub fn example(id: &str, name: &str) -> Self {
            Self {
                id: id.to_string(),
                name: name.to_string(),
                description: String::new(),
            }
        }
    }
}
