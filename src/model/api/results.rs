use serde::{Deserialize, Serialize};

use crate::model::{common::YearGroup, mongodb::Id};

/// One candidate's share of the vote for a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: Id,
    pub name: String,
    pub year_group: YearGroup,
    pub votes: u64,
    /// Share of the position's total, rounded to one decimal place.
    pub percentage: f64,
    pub is_winner: bool,
}

/// Results for a single position, candidates sorted by votes descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionResults {
    pub position_id: Id,
    pub title: String,
    pub total_votes: u64,
    pub candidates: Vec<CandidateResult>,
}

impl PositionResults {
    /// Assemble results from per-candidate vote counts: compute percentages,
    /// sort by votes descending, and flag the winner (if anyone got a vote).
    pub fn compute(
        position_id: Id,
        title: String,
        counts: Vec<(Id, String, YearGroup, u64)>,
    ) -> Self {
        let total_votes: u64 = counts.iter().map(|(_, _, _, votes)| votes).sum();
        let mut candidates = counts
            .into_iter()
            .map(|(candidate_id, name, year_group, votes)| CandidateResult {
                candidate_id,
                name,
                year_group,
                votes,
                percentage: percentage(votes, total_votes),
                is_winner: false,
            })
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| b.votes.cmp(&a.votes));
        if let Some(first) = candidates.first_mut() {
            if first.votes > 0 {
                first.is_winner = true;
            }
        }
        Self {
            position_id,
            title,
            total_votes,
            candidates,
        }
    }
}

/// Full results for an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: Id,
    pub title: String,
    pub positions: Vec<PositionResults>,
}

/// Percentage of `part` in `total`, rounded to one decimal place.
/// Zero totals give zero rather than a division error.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}
