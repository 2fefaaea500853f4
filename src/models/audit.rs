//! Append-only audit records

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One audit trail entry. Append-only; old entries may be purged by the
/// retention job.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub details: String,
    pub user_id: Option<Uuid>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        details: impl Into<String>,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            details: details.into(),
            user_id,
            ip: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }
}
