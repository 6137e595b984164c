use std::fmt::{self, Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};

/// The kinds of administrative action recorded in the audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// Results made visible to students.
    Publish,
    /// Election closed to further votes.
    Close,
    /// Results exported as CSV.
    Export,
    /// Voter eligibility changed.
    Eligibility,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Publish => "publish",
            Self::Close => "close",
            Self::Export => "export",
            Self::Eligibility => "eligibility",
        };
        write!(f, "{}", name)
    }
}

impl From<AuditAction> for Bson {
    fn from(action: AuditAction) -> Self {
        to_bson(&action).expect("Serialisation is infallible")
    }
}
