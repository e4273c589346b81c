use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::model::{
    common::{
        election::{CandidateId, ElectionId, PositionId},
        session::SessionStatus,
    },
    db::session::VotingSession,
    mongodb::Id,
    store::{DynStore, Insertion},
};
use crate::voting::catalog::BallotCatalog;

/// How long past its expiry a committing session is given to finish before it
/// is considered dead.
pub const COMMIT_GRACE_SECONDS: i64 = 5 * 60;

/// How many times `start` retries after losing a race for the voter's slot.
const MAX_START_ATTEMPTS: usize = 3;

/// Owns the voting session lifecycle.
///
/// The stored status is the single point of mutual exclusion for a session;
/// every transition here is a compare-and-set against the status we last saw.
#[derive(Clone)]
pub struct SessionManager {
    store: DynStore,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: DynStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Start or resume the voter's session for an election open for voting.
    pub async fn start(&self, election_id: ElectionId, voter_id: &str) -> Result<VotingSession> {
        let now = Utc::now();
        BallotCatalog::fetch(self.store.as_ref(), election_id, now).await?;

        for _ in 0..MAX_START_ATTEMPTS {
            if self
                .store
                .vote_record_for_voter(voter_id, election_id)
                .await?
                .is_some()
            {
                return Err(Error::AlreadyVoted(election_id));
            }

            if let Some(existing) = self.store.live_session(voter_id, election_id).await? {
                let existing = self.refresh(existing, now).await?;
                match existing.status {
                    SessionStatus::Active => {
                        debug!("Resuming session {}", existing.id);
                        return Ok(existing);
                    }
                    SessionStatus::Completed => return Err(Error::AlreadyVoted(election_id)),
                    SessionStatus::Committing => {
                        return Err(Error::DuplicateSubmission(existing.id))
                    }
                    // Lapsed just now, the slot is free.
                    SessionStatus::Expired | SessionStatus::Abandoned => {}
                }
            }

            let session = VotingSession::new(election_id, voter_id, self.ttl);
            match self.store.insert_session(&session).await? {
                Insertion::Inserted => {
                    info!(
                        "Started session {} in election {election_id}, expires at {}",
                        session.id, session.expires_at
                    );
                    return Ok(session);
                }
                Insertion::Duplicate => {
                    debug!("Lost the race for a voter slot in election {election_id}, retrying");
                }
            }
        }

        Err(Error::invariant(format!(
            "Could not claim a voter slot in election {election_id} after {MAX_START_ATTEMPTS} attempts"
        )))
    }

    /// Get a session, brought up to date.
    pub async fn session(&self, session_id: Id) -> Result<VotingSession> {
        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;
        self.refresh(session, Utc::now()).await
    }

    /// Get a session belonging to the given voter. Other voters' sessions are
    /// reported as not found.
    pub async fn session_for_voter(&self, session_id: Id, voter_id: &str) -> Result<VotingSession> {
        let session = self.session(session_id).await?;
        if session.voter_id != voter_id {
            return Err(Error::SessionNotFound(session_id));
        }
        Ok(session)
    }

    /// Get the catalog of a session's election, whatever the election's state.
    pub async fn catalog(&self, election_id: ElectionId) -> Result<BallotCatalog> {
        let election = self
            .store
            .election(election_id)
            .await?
            .ok_or(Error::ElectionNotFound(election_id))?;
        Ok(BallotCatalog::from_election(&election))
    }

    /// Get the voter's session, failing unless it is open for changes.
    pub async fn open_session(&self, session_id: Id, voter_id: &str) -> Result<VotingSession> {
        let session = self.session_for_voter(session_id, voter_id).await?;
        ensure_open(&session, Utc::now())?;
        Ok(session)
    }

    /// Toggle a candidate in the session's draft selections.
    pub async fn select(
        &self,
        session_id: Id,
        voter_id: &str,
        position_id: PositionId,
        candidate_id: &CandidateId,
    ) -> Result<VotingSession> {
        let mut session = self.open_session(session_id, voter_id).await?;
        let catalog = BallotCatalog::fetch(self.store.as_ref(), session.election_id, Utc::now()).await?;
        session
            .selections
            .select(&catalog, position_id, candidate_id)?;
        self.save_selections(session).await
    }

    /// Toggle abstention in the session's draft selections.
    pub async fn abstain(
        &self,
        session_id: Id,
        voter_id: &str,
        position_id: PositionId,
    ) -> Result<VotingSession> {
        let mut session = self.open_session(session_id, voter_id).await?;
        let catalog = BallotCatalog::fetch(self.store.as_ref(), session.election_id, Utc::now()).await?;
        session.selections.abstain(&catalog, position_id)?;
        self.save_selections(session).await
    }

    async fn save_selections(&self, session: VotingSession) -> Result<VotingSession> {
        if self
            .store
            .save_selections(session.id, &session.selections)
            .await?
        {
            return Ok(session);
        }
        // The session left the active state under us.
        let current = self.session(session.id).await?;
        ensure_open(&current, Utc::now())?;
        Err(Error::invariant(format!(
            "Session {} is open but its selections could not be saved",
            session.id
        )))
    }

    /// Mark a session completed. Only valid once its vote record is committed.
    pub async fn complete(&self, session_id: Id) -> Result<()> {
        if self
            .store
            .vote_record_for_session(session_id)
            .await?
            .is_none()
        {
            return Err(Error::invariant(format!(
                "Attempted to complete session {session_id} with no vote record"
            )));
        }

        for from in [SessionStatus::Committing, SessionStatus::Active] {
            if self
                .store
                .transition_session(session_id, from, SessionStatus::Completed)
                .await?
            {
                return Ok(());
            }
        }

        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;
        if session.status != SessionStatus::Completed {
            // The record is authoritative; reads will report the session as completed.
            warn!(
                "Session {session_id} has a vote record but is {:?}",
                session.status
            );
        }
        Ok(())
    }

    /// Lapse every session whose time is up.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let mut summary = SweepSummary::default();
        for session in self.store.lapsed_sessions(now).await? {
            let before = session.status;
            let after = self.refresh(session, now).await?.status;
            match after {
                _ if after == before => summary.pending += 1,
                SessionStatus::Expired => summary.expired += 1,
                SessionStatus::Abandoned => summary.abandoned += 1,
                SessionStatus::Completed => summary.completed += 1,
                SessionStatus::Active | SessionStatus::Committing => summary.pending += 1,
            }
        }
        Ok(summary)
    }

    /// Bring a stored session up to date: infer completion from a committed
    /// record, then lapse it if its time is up.
    async fn refresh(&self, session: VotingSession, now: DateTime<Utc>) -> Result<VotingSession> {
        let mut session = self.heal(session).await?;

        let target = match session.status {
            SessionStatus::Active if session.is_expired_at(now) => {
                if session.selections.is_empty() {
                    SessionStatus::Abandoned
                } else {
                    SessionStatus::Expired
                }
            }
            SessionStatus::Committing
                if now >= session.expires_at + Duration::seconds(COMMIT_GRACE_SECONDS) =>
            {
                warn!("Session {} never finished committing, expiring it", session.id);
                SessionStatus::Expired
            }
            _ => return Ok(session),
        };

        if self
            .store
            .transition_session(session.id, session.status, target)
            .await?
        {
            debug!("Session {} is now {target:?}", session.id);
            session.set_status(target);
            Ok(session)
        } else {
            // Someone else moved it first; report whatever won.
            let current = self
                .store
                .session(session.id)
                .await?
                .ok_or(Error::SessionNotFound(session.id))?;
            self.heal(current).await
        }
    }

    /// Report a session with a committed vote record as completed, persisting
    /// the change where the lifecycle allows it.
    async fn heal(&self, mut session: VotingSession) -> Result<VotingSession> {
        if session.status == SessionStatus::Completed {
            return Ok(session);
        }
        if self
            .store
            .vote_record_for_session(session.id)
            .await?
            .is_none()
        {
            return Ok(session);
        }
        if session.status.can_transition_to(SessionStatus::Completed)
            && self
                .store
                .transition_session(session.id, session.status, SessionStatus::Completed)
                .await?
        {
            info!("Healed session {} to completed", session.id);
        }
        session.set_status(SessionStatus::Completed);
        Ok(session)
    }
}

/// Fail unless the session accepts selections and submissions at `now`.
pub fn ensure_open(session: &VotingSession, now: DateTime<Utc>) -> Result<()> {
    match session.status {
        SessionStatus::Active if !session.is_expired_at(now) => Ok(()),
        SessionStatus::Active | SessionStatus::Expired | SessionStatus::Abandoned => {
            Err(Error::SessionExpired(session.id))
        }
        SessionStatus::Committing => Err(Error::DuplicateSubmission(session.id)),
        SessionStatus::Completed => Err(Error::AlreadyVoted(session.election_id)),
    }
}

/// What a sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub expired: usize,
    pub abandoned: usize,
    /// Sessions found to have a committed record.
    pub completed: usize,
    /// Committing sessions still within their grace period.
    pub pending: usize,
}

impl SweepSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Display for SweepSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} expired, {} abandoned, {} completed, {} pending",
            self.expired, self.abandoned, self.completed, self.pending
        )
    }
}
