use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{ElectionPhase, ElectionState},
    mongodb::Id,
};

/// Core election data, as stored in the database.
///
/// Candidates are embedded: they have no life of their own outside their
/// election, and casting needs the whole candidate set in one read.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Administrator-set state; only gates visibility.
    pub state: ElectionState,
    /// Start of the voting window (inclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// End of the voting window (exclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Candidates standing in this election.
    pub candidates: Vec<Candidate>,
}

impl ElectionCore {
    /// Create a new published election.
    pub fn new(
        title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            title,
            state: ElectionState::Published,
            start_time,
            end_time,
            candidates,
        }
    }

    /// The voter-facing phase of this election at time `now`.
    pub fn phase_at(&self, now: DateTime<Utc>) -> ElectionPhase {
        ElectionPhase::derive(self.state, self.start_time, self.end_time, now)
    }

    /// Look up a candidate by ID.
    pub fn candidate(&self, candidate_id: Id) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == candidate_id)
    }

    /// Candidates in display order: ascending `position`, embedded order
    /// (i.e. creation order) breaking ties.
    pub fn candidates_in_display_order(&self) -> Vec<&Candidate> {
        let mut candidates = self.candidates.iter().collect::<Vec<_>>();
        candidates.sort_by_key(|c| c.position);
        candidates
    }
}

/// A candidate standing in an election.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Display ordering key.
    pub position: u32,
}

impl Candidate {
    pub fn new(name: String, position: u32) -> Self {
        Self {
            id: Id::new(),
            name,
            bio: None,
            image_url: None,
            position,
        }
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    fn example_candidates() -> Vec<Candidate> {
        vec![
            Candidate::new("Clara Okafor".to_string(), 1),
            Candidate::new("Tomas Reyes".to_string(), 2),
        ]
    }

    impl ElectionCore {
        /// An election currently inside its voting window.
        pub fn active_example() -> Self {
            let now = Utc::now();
            Self::new(
                "Student Union President".to_string(),
                now - Duration::hours(1),
                now + Duration::hours(1),
                example_candidates(),
            )
        }

        /// An election whose window has yet to open.
        pub fn upcoming_example() -> Self {
            let now = Utc::now();
            Self::new(
                "Student Union President".to_string(),
                now + Duration::days(1),
                now + Duration::days(2),
                example_candidates(),
            )
        }

        /// An election whose window has closed.
        pub fn ended_example() -> Self {
            let now = Utc::now();
            Self::new(
                "Student Union President".to_string(),
                now - Duration::days(2),
                now - Duration::days(1),
                example_candidates(),
            )
        }

        /// An election still under construction.
        pub fn draft_example() -> Self {
            Self {
                state: ElectionState::Draft,
                ..Self::active_example()
            }
        }
    }

    #[test]
    fn display_order_is_stable_under_position_ties() {
        let mut election = ElectionCore::active_example();
        election.candidates.push(Candidate::new("Priya Nair".to_string(), 1));

        let ordered = election.candidates_in_display_order();
        let names = ordered.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        // Both position-1 candidates keep their embedded order.
        assert_eq!(names, vec!["Clara Okafor", "Priya Nair", "Tomas Reyes"]);
    }
}
