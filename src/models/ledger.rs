//! Ledger entry models.
//!
//! Every wallet mutation that moves money appends one row to
//! `ledger_entries`. Rows are never updated except for a settlement run
//! flipping `uncleared` deposits to `cleared`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum EntryKind {
        Deposit => "deposit",
        Payout => "payout",
        Fee => "fee",
        Reversal => "reversal",
        Adjustment => "adjustment",
    }
}

text_enum! {
    pub enum Direction {
        Credit => "credit",
        Debit => "debit",
    }
}

text_enum! {
    pub enum EntryStatus {
        Cleared => "cleared",
        Uncleared => "uncleared",
    }
}

/// Represents a ledger entry from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,

    pub wallet_id: Uuid,

    #[sqlx(try_from = "String")]
    pub kind: EntryKind,

    #[sqlx(try_from = "String")]
    pub direction: Direction,

    /// Always positive; `direction` carries the sign
    pub amount_cents: i64,

    /// Wallet `balance_cents` right after this entry was applied
    pub balance_after_cents: i64,

    /// Unique per entry; doubles as the idempotency key for deposits
    pub reference: String,

    #[sqlx(try_from = "String")]
    pub status: EntryStatus,

    /// Settlement run that cleared this entry, if any
    pub settlement_id: Option<Uuid>,

    pub description: Option<String>,

    pub metadata: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

/// Entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub wallet_id: Uuid,
    pub kind: EntryKind,
    pub direction: Direction,
    pub amount_cents: i64,
    pub balance_after_cents: i64,
    pub reference: String,
    pub status: EntryStatus,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Query string for ledger listings.
#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    pub kind: Option<EntryKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
