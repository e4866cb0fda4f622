//! Virtual account model.
//!
//! Virtual accounts are real bank account numbers issued by the banking
//! partner. Transfers into them arrive as `deposit.received` webhooks and are
//! credited to the linked wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct VirtualAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    /// NUBAN issued by the partner; unique platform-wide
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    /// Partner's own identifier for the account
    pub provider_reference: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Query string for `GET /admin/virtual-accounts`.
#[derive(Debug, Deserialize)]
pub struct ListVirtualAccountsQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
