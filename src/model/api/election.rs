use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::ElectionPhase,
    db::election::{Candidate, Election},
    mongodb::Id,
};

/// Election list entry: metadata plus the phase derived at response time.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: Id,
    pub title: String,
    pub phase: ElectionPhase,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ElectionSummary {
    pub fn for_election(election: &Election, now: DateTime<Utc>) -> Self {
        Self {
            id: election.id,
            title: election.title.clone(),
            phase: election.phase_at(now),
            start_time: election.start_time,
            end_time: election.end_time,
        }
    }
}

/// Full voter-facing description of one election.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: Id,
    pub title: String,
    pub phase: ElectionPhase,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Candidates in display order.
    pub candidates: Vec<CandidateDescription>,
}

impl ElectionDescription {
    pub fn for_election(election: &Election, now: DateTime<Utc>) -> Self {
        Self {
            id: election.id,
            title: election.title.clone(),
            phase: election.phase_at(now),
            start_time: election.start_time,
            end_time: election.end_time,
            candidates: election
                .candidates_in_display_order()
                .into_iter()
                .map(CandidateDescription::from)
                .collect(),
        }
    }
}

/// One candidate as shown to voters.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl From<&Candidate> for CandidateDescription {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name.clone(),
            bio: candidate.bio.clone(),
            image_url: candidate.image_url.clone(),
        }
    }
}
