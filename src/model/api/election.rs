use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ElectionState, YearGroup},
    db::{
        candidate::Candidate,
        election::{Election, NewElection},
        position::Position,
        student::StudentProfile,
    },
    mongodb::Id,
};

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub eligible_year_groups: HashSet<YearGroup>,
}

impl ElectionSpec {
    /// Form-level validation, mirrored by the conversion below.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("Election title must not be empty.");
        }
        if self.end_time <= self.start_time {
            return Err("End date must be after start date.");
        }
        if self.eligible_year_groups.is_empty() {
            return Err("At least one year group must be eligible.");
        }
        Ok(())
    }
}

impl From<ElectionSpec> for NewElection {
    /// New elections always start as drafts with unpublished results.
    fn from(spec: ElectionSpec) -> Self {
        Self {
            title: spec.title,
            description: spec.description,
            state: ElectionState::Draft,
            start_time: spec.start_time,
            end_time: spec.end_time,
            eligible_year_groups: spec.eligible_year_groups,
            results_published: false,
            created_at: Utc::now(),
        }
    }
}

/// A position specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: u32,
}

fn default_max_candidates() -> u32 {
    10
}

impl PositionSpec {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("Position title must not be empty.");
        }
        if self.max_candidates == 0 {
            return Err("A position must allow at least one candidate.");
        }
        Ok(())
    }
}

/// A candidacy specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    /// Profile ID of the standing student.
    pub student_id: Id,
    #[serde(default)]
    pub manifesto: String,
    #[serde(default = "default_approved")]
    pub is_approved: bool,
}

fn default_approved() -> bool {
    true
}

/// A summary of an election, shorter than the full description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: Id,
    pub title: String,
    pub state: ElectionState,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub results_published: bool,
}

impl From<Election> for ElectionSummary {
    fn from(election: Election) -> Self {
        Self {
            id: election.id,
            title: election.election.title,
            state: election.election.state,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            results_published: election.election.results_published,
        }
    }
}

/// An API-friendly election description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub state: ElectionState,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub eligible_year_groups: HashSet<YearGroup>,
    pub results_published: bool,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id,
            title: election.election.title,
            description: election.election.description,
            state: election.election.state,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            eligible_year_groups: election.election.eligible_year_groups,
            results_published: election.election.results_published,
        }
    }
}

/// A candidate as shown to students: name and manifesto, no internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: Id,
    pub name: String,
    pub year_group: YearGroup,
    pub manifesto: String,
}

impl CandidateDescription {
    pub fn new(candidate: &Candidate, student: &StudentProfile) -> Self {
        Self {
            id: candidate.id,
            name: student.full_name(),
            year_group: student.year_group,
            manifesto: candidate.manifesto.clone(),
        }
    }
}

/// A position within an election detail view, with its approved candidates
/// and the caller's voting status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDetail {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub display_order: i32,
    pub candidates: Vec<CandidateDescription>,
    /// Whether the requesting student has already voted for this position.
    /// Absent for unauthenticated callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_voted: Option<bool>,
}

impl PositionDetail {
    pub fn new(position: &Position, candidates: Vec<CandidateDescription>) -> Self {
        Self {
            id: position.id,
            title: position.title.clone(),
            description: position.description.clone(),
            display_order: position.display_order,
            candidates,
            has_voted: None,
        }
    }
}

/// The full student-facing view of an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDetail {
    #[serde(flatten)]
    pub election: ElectionDescription,
    pub positions: Vec<PositionDetail>,
    /// Whether the requesting student may vote in this election.
    /// Absent for unauthenticated callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible: Option<bool>,
}

/// A dashboard row: one election the caller's year group can vote in,
/// with their progress through its positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionProgress {
    #[serde(flatten)]
    pub summary: ElectionSummary,
    pub total_positions: u64,
    pub voted_positions: u64,
    pub progress_percentage: u32,
    pub voting_complete: bool,
}

impl ElectionProgress {
    pub fn new(summary: ElectionSummary, total_positions: u64, voted_positions: u64) -> Self {
        let progress_percentage = if total_positions > 0 {
            (voted_positions * 100 / total_positions) as u32
        } else {
            0
        };
        Self {
            summary,
            total_positions,
            voted_positions,
            progress_percentage,
            voting_complete: total_positions > 0 && voted_positions >= total_positions,
        }
    }
}
