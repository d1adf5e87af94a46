use std::net::SocketAddr;

use chrono::Utc;
use mongodb::bson::doc;
use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, NotOpenReason, Result},
    model::{
        api::voting::{CastVoteRequest, CastVoteResponse, ReceiptResponse},
        common::election::ElectionPhase,
        db::{
            audit::{self, AuditEvent, AuditLogEntryCore, NewAuditLogEntry},
            election::Election,
            vote::{NewVote, Vote, VoteCore},
            voter::Voter,
        },
        mongodb::{is_duplicate_key_on, Coll, Id, BALLOT_TOKEN_INDEX, VOTER_ELECTION_INDEX},
        token::BallotToken,
    },
};

/// How many fresh tokens to try after a token-index collision before giving
/// up and reporting a storage failure.
const TOKEN_RETRIES: usize = 2;

pub fn routes() -> Vec<Route> {
    routes![cast_vote, get_receipt]
}

/// Cast a ballot.
///
/// The per-gate checks give precise user feedback, but the only mechanism
/// actually preventing a double vote is the `(voter_id, election_id)` unique
/// index hit by the insert: the same voter casting from two sessions at once
/// serializes there, not in any application-level check.
#[post("/elections/<election_id>/votes", data = "<ballot>", format = "json")]
async fn cast_vote(
    election_id: Id,
    ballot: Json<CastVoteRequest>,
    remote: SocketAddr,
    voters: Coll<Voter>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
    audit_log: Coll<NewAuditLogEntry>,
) -> Result<Json<CastVoteResponse>> {
    let ballot = ballot.into_inner();

    // Only OTP-verified voters may cast.
    let voter = voters
        .find_one(ballot.voter_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter with ID '{}'", ballot.voter_id)))?;
    if !voter.verified {
        return Err(Error::VerificationRequired);
    }

    // The election must be inside its voting window. Drafts are invisible,
    // so they read as absent rather than closed.
    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{}'", election_id)))?;
    match election.phase_at(Utc::now()) {
        ElectionPhase::Active => {}
        ElectionPhase::Draft => {
            return Err(Error::not_found(format!("Election with ID '{}'", election_id)))
        }
        ElectionPhase::Upcoming => return Err(Error::ElectionNotOpen(NotOpenReason::NotStarted)),
        ElectionPhase::Ended => return Err(Error::ElectionNotOpen(NotOpenReason::Ended)),
    }

    // Fast feedback for the common repeat-cast case. Racy: the insert below
    // is the authoritative check.
    let existing = votes
        .find_one(
            doc! { "voter_id": ballot.voter_id, "election_id": election_id },
            None,
        )
        .await?;
    if existing.is_some() {
        return Err(Error::AlreadyVoted);
    }

    // The chosen candidate must stand in this election.
    if election.candidate(ballot.candidate_id).is_none() {
        return Err(Error::InvalidCandidate);
    }

    // Insert, regenerating the receipt token on the (vanishingly rare)
    // token collision. A duplicate on the voter/election index means a
    // concurrent cast raced past the pre-check: report it exactly like the
    // pre-check would have.
    let mut vote = VoteCore::new(election_id, ballot.candidate_id, ballot.voter_id);
    let mut retries = TOKEN_RETRIES;
    loop {
        match new_votes.insert_one(&vote, None).await {
            Ok(_) => break,
            Err(ref err) if is_duplicate_key_on(err, VOTER_ELECTION_INDEX) => {
                return Err(Error::AlreadyVoted);
            }
            Err(ref err) if is_duplicate_key_on(err, BALLOT_TOKEN_INDEX) && retries > 0 => {
                retries -= 1;
                vote.ballot_token = BallotToken::random();
            }
            Err(err) => return Err(err.into()),
        }
    }

    audit::record(
        &audit_log,
        AuditLogEntryCore::new(
            AuditEvent::VoteCast,
            ballot.voter_id,
            remote.ip().to_string(),
            doc! { "election_id": election_id },
        ),
    )
    .await;

    Ok(Json(CastVoteResponse {
        ballot_token: vote.ballot_token,
    }))
}

/// Look up the receipt for a previously cast vote.
///
/// Voter, election and token must all match one stored row; a token alone
/// must not let a different authenticated voter enumerate receipts.
#[get("/elections/<election_id>/votes/receipt?<voter_id>&<ballot_token>")]
async fn get_receipt(
    election_id: Id,
    voter_id: Id,
    ballot_token: BallotToken,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<Json<ReceiptResponse>> {
    let vote = votes
        .find_one(
            doc! {
                "election_id": election_id,
                "voter_id": voter_id,
                "ballot_token": ballot_token.as_str(),
            },
            None,
        )
        .await?
        .ok_or_else(|| Error::not_found("No vote matching that voter, election and token"))?;

    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{}'", election_id)))?;
    let candidate_name = election
        .candidate(vote.candidate_id)
        .map(|candidate| candidate.name.clone())
        .ok_or_else(|| Error::not_found(format!("Candidate with ID '{}'", vote.candidate_id)))?;

    Ok(Json(ReceiptResponse {
        candidate_name,
        election_title: election.title.clone(),
        cast_at: vote.cast_at,
    }))
}
