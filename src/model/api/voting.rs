use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{mongodb::Id, token::BallotToken};

/// Request body for casting a vote. The election comes from the route.
#[derive(Debug, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub voter_id: Id,
    pub candidate_id: Id,
}

/// Response body for a successfully cast vote.
#[derive(Debug, Serialize, Deserialize)]
pub struct CastVoteResponse {
    pub ballot_token: BallotToken,
}

/// Response body for a receipt lookup.
///
/// Only returned when voter, election and token all match one stored vote;
/// it is the only place this core discloses a cast vote's candidate.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub candidate_name: String,
    pub election_title: String,
    pub cast_at: DateTime<Utc>,
}
