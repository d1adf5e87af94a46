use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{mongodb::Id, token::BallotToken};

/// Core vote data, as stored in the database.
///
/// At most one row exists per `(voter_id, election_id)`; the collection's
/// unique index, not this type, is what enforces that. Rows are never
/// mutated or deleted.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct VoteCore {
    pub election_id: Id,
    pub candidate_id: Id,
    pub voter_id: Id,
    /// Public receipt token, globally unique across all elections.
    pub ballot_token: BallotToken,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl VoteCore {
    /// Create a new vote with a freshly generated receipt token.
    pub fn new(election_id: Id, candidate_id: Id, voter_id: Id) -> Self {
        Self {
            election_id,
            candidate_id,
            voter_id,
            ballot_token: BallotToken::random(),
            cast_at: Utc::now(),
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

impl DerefMut for Vote {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.vote
    }
}
