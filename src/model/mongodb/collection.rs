use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    audit::{AuditLogEntry, NewAuditLogEntry},
    election::{Election, NewElection},
    otp_request::{NewOtpRequest, OtpRequest},
    vote::{NewVote, Vote},
    voter::{NewVoter, Voter},
};

/// Name of the unique index over `(voter_id, election_id)` on the vote
/// collection: the one-ballot-per-voter-per-election invariant.
pub const VOTER_ELECTION_INDEX: &str = "voter_election_unique";

/// Name of the unique index over `ballot_token` on the vote collection.
pub const BALLOT_TOKEN_INDEX: &str = "ballot_token_unique";

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

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Voter collection
const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}
impl MongoCollection for NewVoter {
    const NAME: &'static str = VOTERS;
}

// Election collection
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}
impl MongoCollection for NewElection {
    const NAME: &'static str = ELECTIONS;
}

// OTP request collection
const OTP_REQUESTS: &str = "otp_requests";
impl MongoCollection for OtpRequest {
    const NAME: &'static str = OTP_REQUESTS;
}
impl MongoCollection for NewOtpRequest {
    const NAME: &'static str = OTP_REQUESTS;
}

// Vote collection
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

// Audit log collection
const AUDIT_LOG: &str = "audit_log";
impl MongoCollection for AuditLogEntry {
    const NAME: &'static str = AUDIT_LOG;
}
impl MongoCollection for NewAuditLogEntry {
    const NAME: &'static str = AUDIT_LOG;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The vote indexes carry fixed names so a duplicate-key write error can be
/// attributed to the constraint it violated.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    // Vote collection: the core double-vote constraint...
    let voter_election_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(VOTER_ELECTION_INDEX.to_string())
                .build(),
        )
        .build();
    // ...and global receipt token uniqueness.
    let ballot_token_index = IndexModel::builder()
        .keys(doc! {"ballot_token": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(BALLOT_TOKEN_INDEX.to_string())
                .build(),
        )
        .build();
    Coll::<Vote>::from_db(db)
        .create_indexes([voter_election_index, ballot_token_index], None)
        .await?;

    // OTP request collection: the most-recent-unverified lookup.
    let otp_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "verified": 1, "created_at": -1})
        .build();
    Coll::<OtpRequest>::from_db(db)
        .create_index(otp_index, None)
        .await?;

    // Audit log collection: retrieval by time is an admin concern, but the
    // index is cheap to maintain on insert.
    let audit_index = IndexModel::builder()
        .keys(doc! {"created_at": 1})
        .build();
    Coll::<AuditLogEntry>::from_db(db)
        .create_index(audit_index, None)
        .await?;

    Ok(())
}
