use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{election::Election, session::VotingSession, vote_record::VoteRecord};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Election collection
impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

// Session collection
impl MongoCollection for VotingSession {
    const NAME: &'static str = "sessions";
}

// Vote record collection
impl MongoCollection for VoteRecord {
    const NAME: &'static str = "vote_records";
}

/// Ensure that all the required indexes exist on the given database.
///
/// These indexes carry the uniqueness guarantees the submission pipeline
/// relies on, so the server must not start without them.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Session collection: one live session per voter and election.
    let live_session_index = IndexModel::builder()
        .keys(doc! {"voterId": 1, "electionId": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! {"holdsSlot": true})
                .build(),
        )
        .build();
    let lapse_index = IndexModel::builder()
        .keys(doc! {"status": 1, "expiresAt": 1})
        .build();
    Coll::<VotingSession>::from_db(db)
        .create_indexes([live_session_index, lapse_index], None)
        .await?;

    // Vote record collection: one record per session, one per voter and election.
    let session_index = IndexModel::builder()
        .keys(doc! {"sessionId": 1})
        .options(unique.clone())
        .build();
    let voter_index = IndexModel::builder()
        .keys(doc! {"voterId": 1, "electionId": 1})
        .options(unique)
        .build();
    let tally_index = IndexModel::builder()
        .keys(doc! {"electionId": 1, "castAt": 1})
        .build();
    Coll::<VoteRecord>::from_db(db)
        .create_indexes([session_index, voter_index, tally_index], None)
        .await?;

    Ok(())
}
