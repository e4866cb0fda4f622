//! Payout data models and API request/response types.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──► processing ──► completed ──► reversed
//!    │            │
//!    └────────────┴──► failed
//! ```
//!
//! `pending → completed` is also allowed when the partner confirms a transfer
//! synchronously. Funds for `amount + fee` are locked while a payout is
//! `pending`/`processing`, taken out on `completed`, released on `failed` and
//! credited back on `reversed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

text_enum! {
    pub enum PayoutStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Reversed => "reversed",
    }
}

impl PayoutStatus {
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Reversed)
        )
    }

    /// Funds are still reserved in the wallet.
    pub fn holds_funds(self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PayoutStatus::Failed | PayoutStatus::Reversed)
    }

    /// Check a transition, returning `InvalidStateTransition` when it is not allowed.
    pub fn ensure_transition(self, next: PayoutStatus) -> Result<(), AppError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// Represents a payout record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payout {
    pub id: Uuid,

    pub user_id: Uuid,

    pub wallet_id: Uuid,

    /// Client-supplied idempotency key, also sent to the partner
    pub reference: String,

    pub amount_cents: i64,

    pub fee_cents: i64,

    pub currency: String,

    pub bank_code: String,

    pub account_number: String,

    pub account_name: String,

    pub narration: Option<String>,

    #[sqlx(try_from = "String")]
    pub status: PayoutStatus,

    /// Partner's transfer id, known once the partner accepts the transfer
    pub provider_reference: Option<String>,

    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Payout {
    /// Amount reserved in (and finally taken from) the wallet.
    pub fn total_cents(&self) -> i64 {
        self.amount_cents + self.fee_cents
    }
}

/// Request to send money to an external bank account.
///
/// # JSON Example
///
/// ```json
/// {
///   "amount_cents": 500000,
///   "bank_code": "058",
///   "account_number": "0123456789",
///   "account_name": "Ada Obi",
///   "narration": "Rent",
///   "reference": "rent-2025-12"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayoutRequest {
    pub amount_cents: i64,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub narration: Option<String>,
    pub reference: String,
}

impl CreatePayoutRequest {
    /// Validate and trim the request.
    ///
    /// # Rules
    ///
    /// - amount must be positive
    /// - account number must be exactly 10 digits (NUBAN)
    /// - bank code must be non-empty
    /// - account name must be 1-64 characters
    /// - reference must be 1-64 characters
    /// - narration is at most 100 characters
    pub fn validated(self) -> Result<Self, AppError> {
        if self.amount_cents <= 0 {
            return Err(AppError::InvalidRequest("Amount must be positive".to_string()));
        }

        let account_number = self.account_number.trim().to_string();
        if account_number.len() != 10 || !account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::InvalidRequest(
                "Account number must be 10 digits".to_string(),
            ));
        }

        let bank_code = self.bank_code.trim().to_string();
        if bank_code.is_empty() {
            return Err(AppError::InvalidRequest("Bank code is required".to_string()));
        }

        let account_name = self.account_name.trim().to_string();
        if account_name.is_empty() || account_name.chars().count() > 64 {
            return Err(AppError::InvalidRequest(
                "Account name must be 1-64 characters".to_string(),
            ));
        }

        let reference = self.reference.trim().to_string();
        if reference.is_empty() || reference.chars().count() > 64 {
            return Err(AppError::InvalidRequest(
                "Reference must be 1-64 characters".to_string(),
            ));
        }

        let narration = self
            .narration
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if narration.as_ref().is_some_and(|n| n.len() > 100) {
            return Err(AppError::InvalidRequest(
                "Narration must be at most 100 characters".to_string(),
            ));
        }

        Ok(Self {
            amount_cents: self.amount_cents,
            bank_code,
            account_number,
            account_name,
            narration,
            reference,
        })
    }
}

/// Request body for `POST /api/v1/payouts/quote`.
#[derive(Debug, Deserialize)]
pub struct PayoutQuoteRequest {
    pub amount_cents: i64,
}

/// Fee preview for a payout amount.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PayoutQuote {
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub total_cents: i64,
    pub currency: String,
}

/// Query string for payout listings.
#[derive(Debug, Deserialize)]
pub struct ListPayoutsQuery {
    pub status: Option<PayoutStatus>,
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use PayoutStatus::*;

    fn request() -> CreatePayoutRequest {
        CreatePayoutRequest {
            amount_cents: 500_000,
            bank_code: "058".into(),
            account_number: "0123456789".into(),
            account_name: "Ada Obi".into(),
            narration: Some("  ".into()),
            reference: "rent-2025-12".into(),
        }
    }

    #[test]
    fn allowed_transitions() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Reversed));
    }

    #[test]
    fn terminal_states_do_not_move() {
        for next in [Pending, Processing, Completed, Failed, Reversed] {
            assert!(!Failed.can_transition_to(next));
            assert!(!Reversed.can_transition_to(next));
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn only_in_flight_payouts_hold_funds() {
        assert!(Pending.holds_funds());
        assert!(Processing.holds_funds());
        assert!(!Completed.holds_funds());
        assert!(!Failed.holds_funds());
    }

    #[test]
    fn ensure_transition_reports_both_states() {
        let err = Failed.ensure_transition(Completed).unwrap_err();
        assert_eq!(err.to_string(), "Cannot move from failed to completed");
    }

    #[test]
    fn valid_request_is_trimmed_and_blank_narration_dropped() {
        let req = request().validated().unwrap();
        assert_eq!(req.narration, None);
        assert_eq!(req.reference, "rent-2025-12");
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let mut bad = vec![];

        let mut r = request();
        r.amount_cents = 0;
        bad.push(r);

        let mut r = request();
        r.account_number = "12345".into();
        bad.push(r);

        let mut r = request();
        r.account_number = "01234567AB".into();
        bad.push(r);

        let mut r = request();
        r.bank_code = "   ".into();
        bad.push(r);

        let mut r = request();
        r.account_name = "a".repeat(65);
        bad.push(r);

        let mut r = request();
        r.reference = " ".into();
        bad.push(r);

        let mut r = request();
        r.reference = "x".repeat(65);
        bad.push(r);

        let mut r = request();
        r.narration = Some("n".repeat(101));
        bad.push(r);

        for r in bad {
            assert!(r.clone().validated().is_err(), "{r:?}");
        }
    }

    #[test]
    fn bank_code_and_reference_are_free_form() {
        let mut r = request();
        r.bank_code = " GTBINGLA ".into();
        r.reference = "inv#2025/12".into();
        r.account_name = "n".repeat(64);

        let req = r.validated().unwrap();
        assert_eq!(req.bank_code, "GTBINGLA");
        assert_eq!(req.reference, "inv#2025/12");
    }

    #[test]
    fn long_account_name_is_rejected() {
        let mut r = request();
        r.account_name = "n".repeat(150);
        assert!(matches!(r.validated(), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn total_includes_fee() {
        let now = Utc::now();
        let payout = Payout {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            reference: "r".into(),
            amount_cents: 10_000,
            fee_cents: 50,
            currency: "NGN".into(),
            bank_code: "058".into(),
            account_number: "0123456789".into(),
            account_name: "Ada".into(),
            narration: None,
            status: Pending,
            provider_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(payout.total_cents(), 10_050);
    }
}
