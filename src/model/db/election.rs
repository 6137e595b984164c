use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ElectionState, YearGroup},
    db::student::StudentProfile,
    mongodb::Id,
};

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Lifecycle state.
    pub state: ElectionState,
    /// Voting opens (if the election is active).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting closes.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Year groups allowed to vote.
    pub eligible_year_groups: HashSet<YearGroup>,
    /// Whether results are visible to students.
    pub results_published: bool,
    /// Creation timestamp.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ElectionCore {
    /// Is voting currently open?
    pub fn is_voting_open(&self) -> bool {
        let now = Utc::now();
        self.state == ElectionState::Active && self.start_time <= now && now <= self.end_time
    }

    /// Can the given student vote in this election?
    ///
    /// Suspended students are never eligible, and otherwise eligibility is
    /// by year group membership.
    pub fn is_student_eligible(&self, student: &StudentProfile) -> bool {
        student.is_eligible && self.eligible_year_groups.contains(&student.year_group)
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
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
    use super::*;

    use crate::model::api::election::ElectionSpec;

    impl ElectionCore {
        /// A draft election whose window is in the future.
        pub fn draft_example() -> Self {
            ElectionSpec::future_example().into()
        }

        /// An active election currently accepting votes.
        pub fn active_example() -> Self {
            let mut election: Self = ElectionSpec::current_example().into();
            election.state = ElectionState::Active;
            election
        }

        /// An active election whose voting window has already closed.
        pub fn expired_example() -> Self {
            let mut election: Self = ElectionSpec::past_example().into();
            election.state = ElectionState::Active;
            election
        }

        /// A closed election with published results.
        pub fn closed_example() -> Self {
            let mut election: Self = ElectionSpec::past_example().into();
            election.state = ElectionState::Closed;
            election.results_published = true;
            election
        }
    }
}
