use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{common::AuditAction, db::audit_log::AuditLog, mongodb::Id};

/// An audit log entry as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogDescription {
    pub id: Id,
    pub user_id: Id,
    pub username: String,
    pub action: AuditAction,
    pub description: String,
    pub target_kind: String,
    pub target_id: Option<Id>,
    pub ip_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<AuditLog> for AuditLogDescription {
    fn from(log: AuditLog) -> Self {
        Self {
            id: log.id,
            user_id: log.entry.user_id,
            username: log.entry.username,
            action: log.entry.action,
            description: log.entry.description,
            target_kind: log.entry.target_kind,
            target_id: log.entry.target_id,
            ip_address: log.entry.ip_address,
            timestamp: log.entry.timestamp,
        }
    }
}
