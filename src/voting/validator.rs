//! Pure checks of selection legality against the catalog rules.
//!
//! Everything here runs identically on the client (advisory) and inside the
//! submission pipeline (authoritative).

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::model::common::{
    ballot::PositionVote,
    election::{CandidateId, Position, PositionId},
};
use crate::voting::{catalog::BallotCatalog, selection::PositionSelection};

/// Why a position's entry is unacceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "code")]
pub enum ViolationReason {
    /// The ballot has no entry for a position on the catalog.
    MissingEntry,
    /// The ballot has an entry for a position not on the catalog.
    UnknownPosition,
    /// The ballot has more than one entry for the position.
    DuplicateEntry,
    UnknownCandidate { candidate_id: CandidateId },
    DuplicateCandidate { candidate_id: CandidateId },
    AbstainNotAllowed,
    AbstainWithSelections,
    TooFewSelections { min: u32, actual: usize },
    TooManySelections { max: u32, actual: usize },
}

/// A violated position and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub position_id: PositionId,
    #[serde(flatten)]
    pub reason: ViolationReason,
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let position = self.position_id;
        match &self.reason {
            ViolationReason::MissingEntry => write!(f, "Position {position}: no selection made"),
            ViolationReason::UnknownPosition => {
                write!(f, "Position {position}: not on this ballot")
            }
            ViolationReason::DuplicateEntry => {
                write!(f, "Position {position}: more than one entry")
            }
            ViolationReason::UnknownCandidate { candidate_id } => write!(
                f,
                "Position {position}: candidate '{candidate_id}' does not stand for this position"
            ),
            ViolationReason::DuplicateCandidate { candidate_id } => write!(
                f,
                "Position {position}: candidate '{candidate_id}' selected more than once"
            ),
            ViolationReason::AbstainNotAllowed => write!(
                f,
                "Position {position}: abstaining is not allowed in this election"
            ),
            ViolationReason::AbstainWithSelections => write!(
                f,
                "Position {position}: cannot abstain and select candidates at once"
            ),
            ViolationReason::TooFewSelections { min, actual } => write!(
                f,
                "Position {position}: at least {min} selection(s) required, {actual} made"
            ),
            ViolationReason::TooManySelections { max, actual } => write!(
                f,
                "Position {position}: at most {max} selection(s) allowed, {actual} made"
            ),
        }
    }
}

/// Can the voter move past this position?
///
/// True iff they abstain, or have met the position's minimum. The maximum is
/// enforced structurally by [`SelectionState::select`](super::selection::SelectionState::select).
pub fn can_advance(position: &Position, entry: Option<&PositionSelection>) -> bool {
    match entry {
        Some(entry) if entry.is_abstaining() => true,
        Some(entry) => entry.candidate_ids().len() >= position.min_selections as usize,
        None => position.min_selections == 0,
    }
}

/// Check a complete ballot against the catalog.
///
/// Every violation is reported, in ballot-then-catalog order, so that callers
/// can surface all of them at once. The first entry is the first violated
/// position.
pub fn can_submit(catalog: &BallotCatalog, votes: &[PositionVote]) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    // Entries the catalog does not know, or knows more than once.
    let mut seen = HashSet::new();
    for vote in votes {
        let reason = if catalog.position(vote.position_id).is_none() {
            ViolationReason::UnknownPosition
        } else if !seen.insert(vote.position_id) {
            ViolationReason::DuplicateEntry
        } else {
            continue;
        };
        violations.push(Violation {
            position_id: vote.position_id,
            reason,
        });
    }

    // Every catalog position must be present and within its rules.
    for position in &catalog.positions {
        match votes.iter().find(|v| v.position_id == position.id) {
            Some(vote) => check_entry(catalog, position, vote, &mut violations),
            None => violations.push(Violation {
                position_id: position.id,
                reason: ViolationReason::MissingEntry,
            }),
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Check one entry against its position's rules.
fn check_entry(
    catalog: &BallotCatalog,
    position: &Position,
    vote: &PositionVote,
    violations: &mut Vec<Violation>,
) {
    let mut violate = |reason| {
        violations.push(Violation {
            position_id: position.id,
            reason,
        })
    };

    if vote.abstain {
        if !catalog.allow_abstain {
            violate(ViolationReason::AbstainNotAllowed);
        }
        if !vote.candidate_ids.is_empty() {
            violate(ViolationReason::AbstainWithSelections);
        }
        return;
    }

    let mut distinct = HashSet::new();
    for candidate_id in &vote.candidate_ids {
        if position.candidate(candidate_id).is_none() {
            violate(ViolationReason::UnknownCandidate {
                candidate_id: candidate_id.clone(),
            });
        } else if !distinct.insert(candidate_id) {
            violate(ViolationReason::DuplicateCandidate {
                candidate_id: candidate_id.clone(),
            });
        }
    }

    let actual = vote.candidate_ids.len();
    if actual < position.min_selections as usize {
        violate(ViolationReason::TooFewSelections {
            min: position.min_selections,
            actual,
        });
    }
    if actual > position.max_selections as usize {
        violate(ViolationReason::TooManySelections {
            max: position.max_selections,
            actual,
        });
    }
}
