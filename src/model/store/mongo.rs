use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, to_bson, DateTime as BsonDateTime},
    options::FindOptions,
    Database,
};
use rocket::futures::TryStreamExt;

use super::{Insertion, Store};
use crate::error::Result;
use crate::model::{
    common::{election::ElectionId, session::SessionStatus},
    db::{election::Election, session::VotingSession, vote_record::VoteRecord},
    mongodb::{is_duplicate_key_error, Coll, Id},
};
use crate::voting::selection::SelectionState;

/// The production store, backed by MongoDB. Uniqueness is delegated to the
/// indexes created by [`crate::model::mongodb::ensure_indexes_exist`].
pub struct MongoStore {
    elections: Coll<Election>,
    sessions: Coll<VotingSession>,
    vote_records: Coll<VoteRecord>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
            sessions: Coll::from_db(db),
            vote_records: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn election(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.elections.find_one(doc! { "_id": id }, None).await?)
    }

    async fn insert_session(&self, session: &VotingSession) -> Result<Insertion> {
        match self.sessions.insert_one(session, None).await {
            Ok(_) => Ok(Insertion::Inserted),
            Err(e) if is_duplicate_key_error(&e) => Ok(Insertion::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn session(&self, id: Id) -> Result<Option<VotingSession>> {
        Ok(self.sessions.find_one(id.as_doc(), None).await?)
    }

    async fn live_session(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VotingSession>> {
        let filter = doc! {
            "voterId": voter_id,
            "electionId": election_id,
            "holdsSlot": true,
        };
        Ok(self.sessions.find_one(filter, None).await?)
    }

    async fn transition_session(
        &self,
        id: Id,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<bool> {
        let filter = doc! {
            "_id": id,
            "status": from,
        };
        let update = doc! {
            "$set": {
                "status": to,
                "holdsSlot": to.holds_voter_slot(),
            }
        };
        let result = self.sessions.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn claim_session(&self, id: Id, now: DateTime<Utc>) -> Result<bool> {
        let filter = doc! {
            "_id": id,
            "status": SessionStatus::Active,
            "expiresAt": { "$gt": BsonDateTime::from_chrono(now) },
        };
        let update = doc! {
            "$set": {
                "status": SessionStatus::Committing,
                "holdsSlot": SessionStatus::Committing.holds_voter_slot(),
            }
        };
        let result = self.sessions.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn save_selections(&self, id: Id, selections: &SelectionState) -> Result<bool> {
        let filter = doc! {
            "_id": id,
            "status": SessionStatus::Active,
        };
        let update = doc! {
            "$set": {
                "selections": to_bson(selections).expect("Serialisation is infallible"),
            }
        };
        let result = self.sessions.update_one(filter, update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn lapsed_sessions(&self, now: DateTime<Utc>) -> Result<Vec<VotingSession>> {
        let filter = doc! {
            "$or": [{"status": SessionStatus::Active}, {"status": SessionStatus::Committing}],
            "expiresAt": { "$lte": BsonDateTime::from_chrono(now) },
        };
        Ok(self.sessions.find(filter, None).await?.try_collect().await?)
    }

    async fn insert_vote_record(&self, record: &VoteRecord) -> Result<Insertion> {
        match self.vote_records.insert_one(record, None).await {
            Ok(_) => Ok(Insertion::Inserted),
            Err(e) if is_duplicate_key_error(&e) => Ok(Insertion::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn vote_record_for_session(&self, session_id: Id) -> Result<Option<VoteRecord>> {
        let filter = doc! { "sessionId": session_id };
        Ok(self.vote_records.find_one(filter, None).await?)
    }

    async fn vote_record_for_voter(
        &self,
        voter_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VoteRecord>> {
        let filter = doc! {
            "voterId": voter_id,
            "electionId": election_id,
        };
        Ok(self.vote_records.find_one(filter, None).await?)
    }

    async fn vote_records(
        &self,
        election_id: ElectionId,
        until: DateTime<Utc>,
    ) -> Result<Vec<VoteRecord>> {
        let filter = doc! {
            "electionId": election_id,
            "castAt": { "$lte": BsonDateTime::from_chrono(until) },
        };
        let options = FindOptions::builder()
            .sort(doc! { "castAt": 1, "_id": 1 })
            .build();
        Ok(self
            .vote_records
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::{common::ballot::PositionVote, db::vote_record::SealedVote};

    fn sealed(election_id: ElectionId, session_id: Id) -> SealedVote {
        SealedVote {
            election_id,
            session_id,
            content: vec![PositionVote::for_candidates(1, ["alice"])],
            seal: "00".to_string(),
        }
    }

    #[backend_test]
    async fn elections_are_read_back(db: Database) {
        let example = Election::active_example();
        Coll::<Election>::from_db(&db)
            .insert_one(&example, None)
            .await
            .unwrap();

        let store = MongoStore::new(&db);
        let election = store.election(example.id).await.unwrap().unwrap();
        assert_eq!(election.name, example.name);
        assert_eq!(election.positions, example.positions);
        assert!(store.election(99).await.unwrap().is_none());
    }

    #[backend_test]
    async fn one_live_session_per_voter(db: Database) {
        let store = MongoStore::new(&db);
        let ttl = Duration::minutes(30);

        let first = VotingSession::new(1, "voter-1", ttl);
        assert_eq!(store.insert_session(&first).await.unwrap(), Insertion::Inserted);

        // Same voter and election while the first holds the slot.
        let second = VotingSession::new(1, "voter-1", ttl);
        assert_eq!(store.insert_session(&second).await.unwrap(), Insertion::Duplicate);

        // Other elections and other voters are unaffected.
        let elsewhere = VotingSession::new(2, "voter-1", ttl);
        assert_eq!(store.insert_session(&elsewhere).await.unwrap(), Insertion::Inserted);
        let other_voter = VotingSession::new(1, "voter-2", ttl);
        assert_eq!(store.insert_session(&other_voter).await.unwrap(), Insertion::Inserted);

        let live = store.live_session("voter-1", 1).await.unwrap().unwrap();
        assert_eq!(live.id, first.id);
    }

    #[backend_test]
    async fn transitions_are_compare_and_set(db: Database) {
        let store = MongoStore::new(&db);
        let ttl = Duration::minutes(30);

        let first = VotingSession::new(1, "voter-1", ttl);
        store.insert_session(&first).await.unwrap();

        // Wrong expected status changes nothing.
        assert!(!store
            .transition_session(first.id, SessionStatus::Committing, SessionStatus::Completed)
            .await
            .unwrap());
        assert_eq!(
            store.session(first.id).await.unwrap().unwrap().status,
            SessionStatus::Active
        );

        // Expiring frees the slot.
        assert!(store
            .transition_session(first.id, SessionStatus::Active, SessionStatus::Expired)
            .await
            .unwrap());
        assert!(!store
            .transition_session(first.id, SessionStatus::Active, SessionStatus::Expired)
            .await
            .unwrap());
        let expired = store.session(first.id).await.unwrap().unwrap();
        assert_eq!(expired.status, SessionStatus::Expired);
        assert!(!expired.holds_slot());
        assert!(store.live_session("voter-1", 1).await.unwrap().is_none());

        let second = VotingSession::new(1, "voter-1", ttl);
        assert_eq!(store.insert_session(&second).await.unwrap(), Insertion::Inserted);

        // A completed session keeps the slot.
        assert!(store.claim_session(second.id, Utc::now()).await.unwrap());
        assert!(store
            .transition_session(second.id, SessionStatus::Committing, SessionStatus::Completed)
            .await
            .unwrap());
        let completed = store.session(second.id).await.unwrap().unwrap();
        assert!(completed.holds_slot());
        let third = VotingSession::new(1, "voter-1", ttl);
        assert_eq!(store.insert_session(&third).await.unwrap(), Insertion::Duplicate);
    }

    #[backend_test]
    async fn claim_requires_unexpired_session(db: Database) {
        let store = MongoStore::new(&db);

        let lapsed = VotingSession::new(1, "voter-1", Duration::seconds(-1));
        store.insert_session(&lapsed).await.unwrap();
        assert!(!store.claim_session(lapsed.id, Utc::now()).await.unwrap());
        assert_eq!(
            store.session(lapsed.id).await.unwrap().unwrap().status,
            SessionStatus::Active
        );

        let lapsed_ids: Vec<_> = store
            .lapsed_sessions(Utc::now())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(lapsed_ids, vec![lapsed.id]);

        let live = VotingSession::new(1, "voter-2", Duration::minutes(30));
        store.insert_session(&live).await.unwrap();
        assert!(!store
            .claim_session(live.id, live.expires_at + Duration::seconds(1))
            .await
            .unwrap());
        assert!(store.claim_session(live.id, Utc::now()).await.unwrap());
        assert!(!store.claim_session(live.id, Utc::now()).await.unwrap());

        // Selections are frozen once claimed.
        assert!(!store
            .save_selections(live.id, &SelectionState::default())
            .await
            .unwrap());
    }

    #[backend_test]
    async fn one_vote_record_per_session_and_voter(db: Database) {
        let store = MongoStore::new(&db);

        let record = VoteRecord::new("voter-1", sealed(1, Id::new()));
        assert_eq!(store.insert_vote_record(&record).await.unwrap(), Insertion::Inserted);

        // Same session, different voter.
        let same_session = VoteRecord::new("voter-2", sealed(1, record.session_id));
        assert_eq!(
            store.insert_vote_record(&same_session).await.unwrap(),
            Insertion::Duplicate
        );

        // Same voter and election, different session.
        let same_voter = VoteRecord::new("voter-1", sealed(1, Id::new()));
        assert_eq!(
            store.insert_vote_record(&same_voter).await.unwrap(),
            Insertion::Duplicate
        );

        let elsewhere = VoteRecord::new("voter-1", sealed(3, Id::new()));
        assert_eq!(store.insert_vote_record(&elsewhere).await.unwrap(), Insertion::Inserted);

        let by_session = store.vote_record_for_session(record.session_id).await.unwrap();
        assert_eq!(by_session.map(|r| r.id), Some(record.id));
        let by_voter = store.vote_record_for_voter("voter-1", 1).await.unwrap();
        assert_eq!(by_voter.map(|r| r.id), Some(record.id));

        let records = store.vote_records(1, Utc::now()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sealed, record.sealed);
    }
}
