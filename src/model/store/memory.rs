use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{Insertion, Store};
use crate::error::Result;
use crate::model::{
    common::{election::ElectionId, session::SessionStatus},
    db::{election::Election, session::VotingSession, vote_record::VoteRecord},
    mongodb::Id,
};
use crate::voting::selection::SelectionState;

#[derive(Default)]
struct MemoryState {
    elections: HashMap<ElectionId, Election>,
    sessions: HashMap<Id, VotingSession>,
    vote_records: Vec<VoteRecord>,
}

/// An in-memory store with the same uniqueness guarantees as the MongoDB
/// indexes. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// A store holding the example elections.
    pub fn with_examples() -> Self {
        let store = Self::default();
        store.put_election(Election::active_example());
        store.put_election(Election::draft_example());
        store.put_election(Election::completed_example());
        store.put_election(Election::strict_example());
        store
    }

    /// Insert or replace an election.
    pub fn put_election(&self, election: Election) {
        self.lock().elections.insert(election.id, election);
    }

    /// Overwrite a session, bypassing all checks. Used to simulate time passing
    /// or partial failures.
    pub fn put_session(&self, session: VotingSession) {
        self.lock().sessions.insert(session.id, session);
    }

    /// Append a record, bypassing all checks.
    pub fn put_vote_record(&self, record: VoteRecord) {
        self.lock().vote_records.push(record);
    }

    /// Number of committed records for an election.
    pub fn vote_record_count(&self, election_id: ElectionId) -> usize {
        self.lock()
            .vote_records
            .iter()
            .filter(|r| r.election_id == election_id)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn election(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.lock().elections.get(&id).cloned())
    }

    async fn insert_session(&self, session: &VotingSession) -> Result<Insertion> {
        let mut state = self.lock();
        let taken = state.sessions.values().any(|s| {
            s.holds_slot()
                && s.voter_id == session.voter_id
                && s.election_id == session.election_id
        });
        if taken || state.sessions.contains_key(&session.id) {
            return Ok(Insertion::Duplicate);
        }
        state.sessions.insert(session.id, session.clone());
        Ok(Insertion::Inserted)
    }

    async fn session(&self, id: Id) -> Result<Option<VotingSession>> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn live_session(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VotingSession>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| s.holds_slot() && s.voter_id == voter_id && s.election_id == election_id)
            .cloned())
    }

    async fn transition_session(
        &self,
        id: Id,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<bool> {
        let mut state = self.lock();
        match state.sessions.get_mut(&id) {
            Some(session) if session.status == from => {
                session.set_status(to);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_session(&self, id: Id, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        match state.sessions.get_mut(&id) {
            Some(session) if session.is_open_at(now) => {
                session.set_status(SessionStatus::Committing);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_selections(&self, id: Id, selections: &SelectionState) -> Result<bool> {
        let mut state = self.lock();
        match state.sessions.get_mut(&id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.selections = selections.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn lapsed_sessions(&self, now: DateTime<Utc>) -> Result<Vec<VotingSession>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| {
                matches!(s.status, SessionStatus::Active | SessionStatus::Committing)
                    && s.expires_at <= now
            })
            .cloned()
            .collect())
    }

    async fn insert_vote_record(&self, record: &VoteRecord) -> Result<Insertion> {
        let mut state = self.lock();
        let duplicate = state.vote_records.iter().any(|r| {
            r.session_id == record.session_id
                || (r.voter_id == record.voter_id && r.election_id == record.election_id)
        });
        if duplicate {
            return Ok(Insertion::Duplicate);
        }
        state.vote_records.push(record.clone());
        Ok(Insertion::Inserted)
    }

    async fn vote_record_for_session(&self, session_id: Id) -> Result<Option<VoteRecord>> {
        Ok(self
            .lock()
            .vote_records
            .iter()
            .find(|r| r.session_id == session_id)
            .cloned())
    }

    async fn vote_record_for_voter(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VoteRecord>> {
        Ok(self
            .lock()
            .vote_records
            .iter()
            .find(|r| r.voter_id == voter_id && r.election_id == election_id)
            .cloned())
    }

    async fn vote_records(
        &self,
        election_id: ElectionId,
        until: DateTime<Utc>,
    ) -> Result<Vec<VoteRecord>> {
        let mut records: Vec<_> = self
            .lock()
            .vote_records
            .iter()
            .filter(|r| r.election_id == election_id && r.cast_at <= until)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.cast_at, r.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[backend_test]
    async fn claim_requires_unexpired_session(store: MemoryStore) {
        let lapsed = VotingSession::new(1, "voter-1", Duration::seconds(-1));
        store.put_session(lapsed.clone());
        assert!(!store.claim_session(lapsed.id, Utc::now()).await.unwrap());
        assert_eq!(
            store.session(lapsed.id).await.unwrap().unwrap().status,
            SessionStatus::Active
        );

        let live = VotingSession::new(1, "voter-2", Duration::minutes(30));
        store.put_session(live.clone());
        assert!(store.claim_session(live.id, Utc::now()).await.unwrap());
        assert!(!store.claim_session(live.id, Utc::now()).await.unwrap());
        let claimed = store.session(live.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, SessionStatus::Committing);
        assert!(claimed.holds_slot());

        // Claiming at a time past expiry fails even for a live session.
        let other = VotingSession::new(1, "voter-3", Duration::minutes(30));
        store.put_session(other.clone());
        let later = other.expires_at + Duration::seconds(1);
        assert!(!store.claim_session(other.id, later).await.unwrap());
    }
}
