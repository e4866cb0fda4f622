//! Audit log model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One admin (or system) action.
///
/// `actor_user_id` is `None` for actions taken by the platform itself,
/// e.g. bootstrap.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Query string for `GET /admin/audit-logs`.
#[derive(Debug, Deserialize)]
pub struct ListAuditLogsQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
