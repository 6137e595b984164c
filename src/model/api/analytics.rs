use serde::{Deserialize, Serialize};

use crate::model::{common::YearGroup, mongodb::Id};

use super::results::{percentage, PositionResults};

/// Turnout for one year group within an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearGroupTurnout {
    pub year_group: YearGroup,
    /// Eligible student-role accounts in this year group.
    pub eligible: u64,
    /// Distinct students from this year group who voted at least once.
    pub voted: u64,
    pub percentage: f64,
}

impl YearGroupTurnout {
    pub fn new(year_group: YearGroup, eligible: u64, voted: u64) -> Self {
        Self {
            year_group,
            eligible,
            voted,
            percentage: percentage(voted, eligible),
        }
    }
}

/// The full analytics report for an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionAnalytics {
    pub election_id: Id,
    pub title: String,
    pub turnout: Vec<YearGroupTurnout>,
    pub results: Vec<PositionResults>,
    pub position_count: u64,
    pub total_eligible: u64,
    pub total_voted: u64,
    pub overall_turnout: f64,
}

/// Summary statistics for the management dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_elections: u64,
    pub active_elections: u64,
    pub total_candidates: u64,
    pub total_votes: u64,
    pub total_students: u64,
}
