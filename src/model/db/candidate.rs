use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Maximum length of a campaign manifesto, in characters.
pub const MAX_MANIFESTO_LENGTH: usize = 2000;

/// Core candidate data, as stored in the database.
///
/// A candidacy links a student profile to a position. The database enforces
/// that a student stands at most once per position via a unique index on
/// `(position_id, student_id)`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CandidateCore {
    pub position_id: Id,
    /// Denormalised from the position, so election-wide queries need no join.
    pub election_id: Id,
    /// The standing student's profile ID.
    pub student_id: Id,
    /// Campaign manifesto.
    pub manifesto: String,
    /// Unapproved candidates are hidden from students and cannot receive votes.
    pub is_approved: bool,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}
