use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        ballot::{Ballot, ValidationReport},
        receipt::VoteReceipt,
    },
    common::session::SessionStatus,
    db::{session::VotingSession, vote_record::VoteRecord},
    mongodb::Id,
    store::{DynStore, Insertion},
};
use crate::voting::{
    catalog::BallotCatalog,
    sealer::DynSealer,
    session::{ensure_open, SessionManager},
    validator::can_submit,
};

/// Turns a completed session into exactly one immutable vote record.
///
/// The compare-and-set from `Active` to `Committing` serialises submissions
/// for a session; the uniqueness constraints on vote records are the final
/// arbiter between sessions of the same voter.
#[derive(Clone)]
pub struct SubmissionPipeline {
    store: DynStore,
    sealer: DynSealer,
    sessions: SessionManager,
}

impl SubmissionPipeline {
    pub fn new(store: DynStore, sealer: DynSealer, sessions: SessionManager) -> Self {
        Self {
            store,
            sealer,
            sessions,
        }
    }

    /// Check a ballot server-side, collecting every problem found.
    pub async fn validate(&self, voter_id: &str, ballot: &Ballot) -> Result<ValidationReport> {
        let session_id = *ballot.session_id;
        let session = match self.sessions.session_for_voter(session_id, voter_id).await {
            Ok(session) => Some(session),
            Err(Error::SessionNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        let mut errors = Vec::new();
        match &session {
            Some(session) => {
                if let Err(e) = ensure_open(session, now) {
                    errors.push(e.to_string());
                }
            }
            None => errors.push(Error::SessionNotFound(session_id).to_string()),
        }
        errors.extend(self.ballot_errors(ballot, session.as_ref(), now).await?);
        Ok(ValidationReport::from_errors(errors))
    }

    /// Problems with the ballot itself, against its session and the catalog.
    async fn ballot_errors(
        &self,
        ballot: &Ballot,
        session: Option<&VotingSession>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut errors = Vec::new();
        if let Some(session) = session {
            if session.election_id != ballot.election_id {
                errors.push(format!(
                    "Session {} belongs to election {}, not election {}",
                    session.id, session.election_id, ballot.election_id
                ));
            }
        }
        match BallotCatalog::fetch(self.store.as_ref(), ballot.election_id, now).await {
            Ok(catalog) => {
                if let Err(violations) = can_submit(&catalog, &ballot.votes) {
                    errors.extend(violations.iter().map(ToString::to_string));
                }
            }
            Err(e @ (Error::ElectionNotFound(_) | Error::ElectionNotOpenForVoting(_))) => {
                errors.push(e.to_string())
            }
            Err(e) => return Err(e),
        }
        Ok(errors)
    }

    /// Seal and commit a ballot, closing its session.
    pub async fn cast(&self, voter_id: &str, ballot: &Ballot) -> Result<VoteReceipt> {
        let session_id = *ballot.session_id;
        let now = Utc::now();

        // Session problems are conflicts, not validation failures.
        let session = self.sessions.session_for_voter(session_id, voter_id).await?;
        ensure_open(&session, now)?;
        let errors = self.ballot_errors(ballot, Some(&session), now).await?;
        if !errors.is_empty() {
            debug!("Rejected ballot for session {session_id}: {} problem(s)", errors.len());
            return Err(Error::Validation(errors));
        }

        // Claim the session. Expiry is checked again as part of the claim.
        if !self.store.claim_session(session_id, Utc::now()).await? {
            let current = self.sessions.session(session_id).await?;
            ensure_open(&current, Utc::now())?;
            // Reopened by a failed concurrent submission.
            return Err(Error::DuplicateSubmission(session_id));
        }

        // Seal. Nothing has been recorded yet, so a failure here is undone
        // and the voter may retry.
        let sealed = match self.sealer.seal(ballot).await {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!("Sealing failed for session {session_id}: {e}");
                self.release(session_id).await?;
                return Err(e.into());
            }
        };

        // Commit.
        let record = VoteRecord::new(voter_id, sealed);
        match self.store.insert_vote_record(&record).await? {
            Insertion::Inserted => {
                info!(
                    "Committed vote {} for session {session_id} in election {}",
                    record.id, record.election_id
                );
            }
            Insertion::Duplicate => return Err(self.lost_commit(&session).await?),
        }

        // The record is committed; a failure from here on heals on the next read.
        if let Err(e) = self.sessions.complete(session_id).await {
            error!("Vote for session {session_id} committed but session not completed: {e}");
        }
        Ok(VoteReceipt::for_record(&record))
    }

    /// Return a claimed session to `Active` after a failed seal.
    async fn release(&self, session_id: Id) -> Result<()> {
        if !self
            .store
            .transition_session(session_id, SessionStatus::Committing, SessionStatus::Active)
            .await?
        {
            warn!("Session {session_id} left the committing state while sealing");
        }
        Ok(())
    }

    /// Work out why a vote record insert was rejected, and settle the session.
    async fn lost_commit(&self, session: &VotingSession) -> Result<Error> {
        if self
            .store
            .vote_record_for_session(session.id)
            .await?
            .is_some()
        {
            // An earlier submission from this very session succeeded.
            debug!("Session {} already committed its vote", session.id);
            self.sessions.complete(session.id).await?;
        } else {
            // Another session of the same voter won.
            warn!(
                "Voter already voted in election {} from another session, abandoning session {}",
                session.election_id, session.id
            );
            self.store
                .transition_session(
                    session.id,
                    SessionStatus::Committing,
                    SessionStatus::Abandoned,
                )
                .await?;
        }
        Ok(Error::AlreadyVoted(session.election_id))
    }

    /// Re-derive the receipt of a session's committed vote.
    pub async fn receipt(&self, voter_id: &str, session_id: Id) -> Result<VoteReceipt> {
        self.sessions.session_for_voter(session_id, voter_id).await?;
        let record = self
            .store
            .vote_record_for_session(session_id)
            .await?
            .ok_or(Error::NoVoteRecord(session_id))?;
        Ok(VoteReceipt::for_record(&record))
    }
}
