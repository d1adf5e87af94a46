use chrono::{DateTime, Utc};
use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Administrator-set states in the Election lifecycle.
///
/// Whether voting is open is never read from this field; it is derived from
/// the election's time window at the point of use (see [`ElectionPhase`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// Under construction, invisible to voters.
    Draft,
    /// Live. Visible to all; voting is open during the time window.
    Published,
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}

/// The voter-facing phase of an election, derived from its stored state and
/// its `[start_time, end_time)` window at read time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionPhase {
    Draft,
    Upcoming,
    Active,
    Ended,
}

impl ElectionPhase {
    /// Derive the phase for the given state and time window at time `now`.
    pub fn derive(
        state: ElectionState,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        match state {
            ElectionState::Draft => Self::Draft,
            ElectionState::Published => {
                if now < start_time {
                    Self::Upcoming
                } else if now < end_time {
                    Self::Active
                } else {
                    Self::Ended
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    #[test]
    fn phase_follows_time_window() {
        let now = Utc::now();
        let hour = Duration::hours(1);

        assert_eq!(
            ElectionPhase::derive(ElectionState::Published, now - hour, now + hour, now),
            ElectionPhase::Active,
        );
        assert_eq!(
            ElectionPhase::derive(ElectionState::Published, now + hour, now + hour * 2, now),
            ElectionPhase::Upcoming,
        );
        assert_eq!(
            ElectionPhase::derive(ElectionState::Published, now - hour * 2, now - hour, now),
            ElectionPhase::Ended,
        );
        // Draft trumps the window.
        assert_eq!(
            ElectionPhase::derive(ElectionState::Draft, now - hour, now + hour, now),
            ElectionPhase::Draft,
        );
    }

    #[test]
    fn window_boundaries_are_half_open() {
        let start = Utc::now();
        let end = start + Duration::hours(1);

        assert_eq!(
            ElectionPhase::derive(ElectionState::Published, start, end, start),
            ElectionPhase::Active,
        );
        assert_eq!(
            ElectionPhase::derive(ElectionState::Published, start, end, end),
            ElectionPhase::Ended,
        );
    }
}
