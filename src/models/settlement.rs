//! Settlement runs.
//!
//! A settlement clears every uncleared deposit created up to its cutoff,
//! making those funds spendable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Settlement {
    pub id: Uuid,
    pub cutoff: DateTime<Utc>,
    pub entry_count: i64,
    pub total_cents: i64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /admin/settlements`.
///
/// `cutoff` defaults to now.
#[derive(Debug, Deserialize, Default)]
pub struct RunSettlementRequest {
    pub cutoff: Option<DateTime<Utc>>,
}
