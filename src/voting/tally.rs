use std::collections::BTreeSet;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::model::{
    api::{
        receipt::PublishedVote,
        results::{CandidateResult, ElectionResults, PositionResult, PositionSummary, ResultsDump},
    },
    common::{
        ballot::PositionVote,
        election::{ElectionId, ElectionState, Position},
    },
    db::{election::Election, vote_record::VoteRecord},
    store::DynStore,
};
use crate::voting::{catalog::BallotCatalog, sealer::DynSealer, validator::can_submit};

/// Running counts for one position. Candidate counts are indexed by the
/// candidate's listing order.
struct PositionCount {
    counts: Vec<u64>,
    abstained: u64,
    ballots: u64,
}

/// A pure fold of committed votes into results.
pub struct Tally<'c> {
    catalog: &'c BallotCatalog,
    positions: Vec<PositionCount>,
    voters: BTreeSet<String>,
}

impl<'c> Tally<'c> {
    pub fn new(catalog: &'c BallotCatalog) -> Self {
        let positions = catalog
            .positions
            .iter()
            .map(|p| PositionCount {
                counts: vec![0; p.candidates.len()],
                abstained: 0,
                ballots: 0,
            })
            .collect();
        Self {
            catalog,
            positions,
            voters: BTreeSet::new(),
        }
    }

    /// Count one voter's committed votes.
    ///
    /// Committed votes were validated before sealing, so a vote that breaks
    /// the ballot rules (unknown choices, missing or repeated entries,
    /// overvotes) is an invariant violation.
    pub fn add(&mut self, voter_key: &str, votes: &[PositionVote]) -> Result<()> {
        if let Err(violations) = can_submit(self.catalog, votes) {
            let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
            return Err(Error::invariant(format!(
                "Committed vote breaks the ballot rules: {}",
                reasons.join("; ")
            )));
        }
        for vote in votes {
            let index = self
                .catalog
                .positions
                .iter()
                .position(|p| p.id == vote.position_id)
                .ok_or_else(|| {
                    Error::invariant(format!(
                        "Committed vote for unknown position {}",
                        vote.position_id
                    ))
                })?;
            let position = &self.catalog.positions[index];
            let count = &mut self.positions[index];

            count.ballots += 1;
            if vote.abstain {
                count.abstained += 1;
                continue;
            }
            for candidate_id in &vote.candidate_ids {
                let candidate = position.candidate_index(candidate_id).ok_or_else(|| {
                    Error::invariant(format!(
                        "Committed vote for unknown candidate '{candidate_id}' in position {}",
                        position.id
                    ))
                })?;
                count.counts[candidate] += 1;
            }
        }
        self.voters.insert(voter_key.to_string());
        Ok(())
    }

    /// Number of distinct voters counted so far.
    pub fn voters(&self) -> usize {
        self.voters.len()
    }

    pub fn finish(self, election_id: ElectionId, is_final: bool, eligible: u32) -> ElectionResults {
        let position_results = self
            .catalog
            .positions
            .iter()
            .zip(self.positions)
            .map(|(position, count)| position_result(position, count))
            .collect();
        let total_votes = self.voters.len() as u64;
        ElectionResults {
            election_id,
            is_final,
            position_results,
            total_votes,
            total_eligible_voters: eligible,
            turnout_percentage: percentage(total_votes, eligible.into()),
        }
    }
}

fn position_result(position: &Position, count: PositionCount) -> PositionResult {
    let total_votes: u64 = count.counts.iter().sum();

    // Vote count descending, then listing order.
    let mut order: Vec<usize> = (0..position.candidates.len()).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(count.counts[i]), i));

    let results: Vec<CandidateResult> = order
        .iter()
        .map(|&i| {
            let vote_count = count.counts[i];
            // Competition ranking: one more than the number strictly ahead.
            let ahead = count.counts.iter().filter(|&&c| c > vote_count).count();
            CandidateResult {
                candidate_id: position.candidates[i].id.clone(),
                vote_count,
                percentage: percentage(vote_count, total_votes),
                rank: ahead as u32 + 1,
            }
        })
        .collect();

    let (winner, tied_for_first) = match results.as_slice() {
        [] => (None, Vec::new()),
        [first, ..] if first.vote_count == 0 => (None, Vec::new()),
        [first] => (Some(first.candidate_id.clone()), Vec::new()),
        [first, second, ..] if first.vote_count > second.vote_count => {
            (Some(first.candidate_id.clone()), Vec::new())
        }
        _ => (
            None,
            results
                .iter()
                .filter(|r| r.rank == 1)
                .map(|r| r.candidate_id.clone())
                .collect(),
        ),
    };

    PositionResult {
        position: PositionSummary {
            id: position.id,
            name: position.name.clone(),
            order: position.order,
            max_selections: position.max_selections,
        },
        results,
        winner,
        tied_for_first,
        total_votes,
        abstained_votes: count.abstained,
        ballots: count.ballots,
    }
}

/// `part` as a percentage of `whole`, or 0 if `whole` is 0.
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part * 100) as f64 / whole as f64
    }
}

/// Computes results from the committed vote records of an election.
#[derive(Clone)]
pub struct TallyEngine {
    store: DynStore,
    sealer: DynSealer,
}

impl TallyEngine {
    pub fn new(store: DynStore, sealer: DynSealer) -> Self {
        Self { store, sealer }
    }

    /// Results of an active (preliminary) or completed (final) election.
    pub async fn compute(&self, election_id: ElectionId) -> Result<ElectionResults> {
        let election = self.election_with_results(election_id).await?;
        let records = self.store.vote_records(election_id, Utc::now()).await?;
        self.tally(&election, &records)
    }

    /// Everything needed to verify a completed election offline.
    pub async fn dump(&self, election_id: ElectionId) -> Result<ResultsDump> {
        let election = self.election_with_results(election_id).await?;
        if election.state != ElectionState::Completed {
            return Err(Error::ResultsUnavailable(election_id));
        }
        let records = self.store.vote_records(election_id, Utc::now()).await?;
        let results = self.tally(&election, &records)?;
        Ok(ResultsDump {
            catalog: BallotCatalog::from_election(&election),
            eligible_voters: election.eligible_voters,
            votes: records.iter().map(PublishedVote::from_record).collect(),
            results,
        })
    }

    async fn election_with_results(&self, election_id: ElectionId) -> Result<Election> {
        let election = self
            .store
            .election(election_id)
            .await?
            .ok_or(Error::ElectionNotFound(election_id))?;
        if !election.has_results() {
            return Err(Error::ResultsUnavailable(election_id));
        }
        Ok(election)
    }

    fn tally(&self, election: &Election, records: &[VoteRecord]) -> Result<ElectionResults> {
        let catalog = BallotCatalog::from_election(election);
        let mut tally = Tally::new(&catalog);
        for record in records {
            let sealed = &record.sealed;
            if sealed.session_id != record.session_id
                || sealed.election_id != election.id
                || !self.sealer.verify(sealed)
            {
                return Err(Error::invariant(format!(
                    "Vote record {} does not match its seal",
                    record.id
                )));
            }
            tally.add(&record.voter_id, &sealed.content)?;
        }
        trace!(
            "Tallied {} vote(s) in election {}",
            tally.voters(),
            election.id
        );
        Ok(tally.finish(
            election.id,
            election.state == ElectionState::Completed,
            election.eligible_voters,
        ))
    }
}
