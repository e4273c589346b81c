//! The persistence seam. The voting core only talks to a [`Store`]; the
//! uniqueness guarantees it relies on are part of the trait contract.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    common::{election::ElectionId, session::SessionStatus},
    db::{election::Election, session::VotingSession, vote_record::VoteRecord},
    mongodb::Id,
};
use crate::voting::selection::SelectionState;

#[cfg(test)]
mod memory;
mod mongo;

#[cfg(test)]
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Shared handle to the store, as placed in managed state.
pub type DynStore = Arc<dyn Store>;

/// Outcome of an insert guarded by a uniqueness constraint.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    /// A unique constraint rejected the document; nothing was written.
    Duplicate,
}

#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Get an election by ID.
    async fn election(&self, id: ElectionId) -> Result<Option<Election>>;

    /// Insert a new session. Must report `Duplicate` if another session for the
    /// same voter and election already holds the voter's slot.
    async fn insert_session(&self, session: &VotingSession) -> Result<Insertion>;

    /// Get a session by ID.
    async fn session(&self, id: Id) -> Result<Option<VotingSession>>;

    /// Get the session holding the voter's slot for the election, if any.
    async fn live_session(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VotingSession>>;

    /// Atomically move a session from `from` to `to`.
    /// Returns false, changing nothing, if the session was not in state `from`.
    async fn transition_session(
        &self,
        id: Id,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<bool>;

    /// Atomically move a session from `Active` to `Committing`, only if it has
    /// not expired at `now`. Returns false, changing nothing, otherwise.
    async fn claim_session(&self, id: Id, now: DateTime<Utc>) -> Result<bool>;

    /// Replace the draft selections of a session, only while it is active.
    /// Returns false if the session was not active.
    async fn save_selections(&self, id: Id, selections: &SelectionState) -> Result<bool>;

    /// Active or committing sessions whose `expires_at` is not after `now`.
    async fn lapsed_sessions(&self, now: DateTime<Utc>) -> Result<Vec<VotingSession>>;

    /// Insert a vote record. Must report `Duplicate` if a record already exists
    /// for the same session, or for the same voter and election.
    async fn insert_vote_record(&self, record: &VoteRecord) -> Result<Insertion>;

    /// Get the vote record committed by a session.
    async fn vote_record_for_session(&self, session_id: Id) -> Result<Option<VoteRecord>>;

    /// Get the vote record committed by a voter in an election.
    async fn vote_record_for_voter(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VoteRecord>>;

    /// All records for an election cast at or before `until`, ordered by cast time.
    async fn vote_records(
        &self,
        election_id: ElectionId,
        until: DateTime<Utc>,
    ) -> Result<Vec<VoteRecord>>;
}
