use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::AuditAction, mongodb::Id};

/// Core audit log entry data, as stored in the database.
///
/// Every management mutation writes one of these. The username is stored
/// alongside the ID so entries stay meaningful if the account is deleted.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct AuditLogCore {
    pub user_id: Id,
    pub username: String,
    pub action: AuditAction,
    /// Human-readable summary, e.g. "Deleted election: Student Council 2026".
    pub description: String,
    /// The kind of record affected, e.g. "Election".
    pub target_kind: String,
    /// The ID of the affected record, where there is one.
    pub target_id: Option<Id>,
    /// Client IP the request came from, if known.
    pub ip_address: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

/// An audit log entry without an ID.
pub type NewAuditLog = AuditLogCore;

/// An audit log entry from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub entry: AuditLogCore,
}

impl Deref for AuditLog {
    type Target = AuditLogCore;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

impl DerefMut for AuditLog {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry
    }
}
