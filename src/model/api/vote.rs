use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{db::vote::Vote, mongodb::Id};

/// A vote request: the chosen candidate for a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: Id,
}

/// Confirmation of a recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteConfirmation {
    pub election_id: Id,
    pub position_id: Id,
    pub candidate_id: Id,
    pub cast_at: DateTime<Utc>,
}

impl From<Vote> for VoteConfirmation {
    fn from(vote: Vote) -> Self {
        Self {
            election_id: vote.election_id,
            position_id: vote.position_id,
            candidate_id: vote.candidate_id,
            cast_at: vote.cast_at,
        }
    }
}
