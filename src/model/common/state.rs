use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionState {
    /// Under construction, only visible to admins.
    Draft,
    /// Published; voting is open during the start/end window.
    Active,
    /// Voting has ended. Results may be published.
    Closed,
    /// Completed, hidden by default, but retrievable by all.
    Archived,
}

impl ElectionState {
    /// Is the given lifecycle transition allowed?
    ///
    /// The lifecycle is strictly forward-only:
    /// `Draft -> Active -> Closed -> Archived`, with the shortcut
    /// `Draft -> Archived` for abandoned drafts.
    pub fn can_transition_to(self, next: ElectionState) -> bool {
        matches!(
            (self, next),
            (ElectionState::Draft, ElectionState::Active)
                | (ElectionState::Draft, ElectionState::Archived)
                | (ElectionState::Active, ElectionState::Closed)
                | (ElectionState::Closed, ElectionState::Archived)
        )
    }
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}
