//! Wallet data models and balance arithmetic.
//!
//! A wallet carries three balances, all in minor units (kobo/cents):
//!
//! - `balance`: every credited amount minus every settled debit
//! - `cleared_balance`: the part of `balance` that has cleared settlement
//! - `locked_balance`: the part of `cleared_balance` reserved for in-flight payouts
//!
//! `0 <= locked <= cleared <= balance` always holds, and only
//! `cleared - locked` can be spent. All mutations go through [`Balances`],
//! which refuses any operation that would break the ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Represents a wallet record from the database.
///
/// # Database Table
///
/// Maps to the `wallets` table; one row per user. A CHECK constraint mirrors
/// the balance ordering enforced by [`Balances`].
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub balance_cents: i64,
    pub cleared_balance_cents: i64,
    pub locked_balance_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn balances(&self) -> Balances {
        Balances {
            balance: self.balance_cents,
            cleared: self.cleared_balance_cents,
            locked: self.locked_balance_cents,
        }
    }
}

/// Response body for wallet endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "currency": "NGN",
///   "balance_cents": 150000,
///   "cleared_balance_cents": 100000,
///   "locked_balance_cents": 25000,
///   "available_balance_cents": 75000,
///   "updated_at": "2025-12-20T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub balance_cents: i64,
    pub cleared_balance_cents: i64,
    pub locked_balance_cents: i64,
    pub available_balance_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        let available = wallet.balances().available();
        Self {
            id: wallet.id,
            user_id: wallet.user_id,
            currency: wallet.currency,
            balance_cents: wallet.balance_cents,
            cleared_balance_cents: wallet.cleared_balance_cents,
            locked_balance_cents: wallet.locked_balance_cents,
            available_balance_cents: available,
            updated_at: wallet.updated_at,
        }
    }
}

/// Request body for `POST /admin/wallets/{user_id}/adjustments`.
///
/// Positive amounts credit the wallet (as cleared funds), negative amounts
/// debit available funds.
#[derive(Debug, Deserialize)]
pub struct AdjustWalletRequest {
    pub amount_cents: i64,
    pub reason: String,
}

/// Comparison of a wallet's stored balance with the sum of its ledger.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct WalletReconciliation {
    pub wallet_id: Uuid,
    pub balance_cents: i64,
    pub ledger_balance_cents: i64,
    pub uncleared_ledger_cents: i64,
    pub in_flight_payout_cents: i64,
    #[sqlx(skip)]
    pub consistent: bool,
}

impl WalletReconciliation {
    /// Compare against the wallet row and record the verdict in `consistent`.
    ///
    /// Stored balances must agree with the ledger sum, the net of uncleared
    /// entries and the total held by in-flight payouts.
    pub fn check(mut self, wallet: &Wallet) -> Self {
        self.consistent = self.balance_cents == self.ledger_balance_cents
            && wallet.balances().uncleared() == self.uncleared_ledger_cents
            && wallet.locked_balance_cents == self.in_flight_payout_cents;
        self
    }
}

/// Why a balance operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("insufficient available balance")]
    InsufficientFunds,

    #[error("amount exceeds locked balance")]
    ExceedsLocked,

    #[error("amount exceeds uncleared balance")]
    ExceedsUncleared,

    #[error("balance overflow")]
    Overflow,
}

impl From<BalanceError> for AppError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientFunds => AppError::InsufficientBalance,
            BalanceError::NonPositiveAmount => AppError::InvalidRequest(err.to_string()),
            BalanceError::ExceedsLocked
            | BalanceError::ExceedsUncleared
            | BalanceError::Overflow => AppError::Conflict(format!("Wallet balance error: {}", err)),
        }
    }
}

/// Snapshot of a wallet's three balances.
///
/// Every operation consumes the snapshot and returns the new one, or an error
/// with nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Balances {
    pub balance: i64,
    pub cleared: i64,
    pub locked: i64,
}

impl Balances {
    /// Spendable funds.
    pub fn available(&self) -> i64 {
        self.cleared - self.locked
    }

    /// Funds credited but not yet settled.
    pub fn uncleared(&self) -> i64 {
        self.balance - self.cleared
    }

    /// Add funds; `cleared` decides whether they are spendable immediately.
    pub fn credit(self, amount: i64, cleared: bool) -> Result<Self, BalanceError> {
        positive(amount)?;
        let balance = self.balance.checked_add(amount).ok_or(BalanceError::Overflow)?;
        let cleared_balance = if cleared {
            self.cleared.checked_add(amount).ok_or(BalanceError::Overflow)?
        } else {
            self.cleared
        };
        Ok(Self {
            balance,
            cleared: cleared_balance,
            ..self
        })
    }

    /// Move uncleared funds to cleared.
    pub fn clear(self, amount: i64) -> Result<Self, BalanceError> {
        positive(amount)?;
        if amount > self.uncleared() {
            return Err(BalanceError::ExceedsUncleared);
        }
        Ok(Self {
            cleared: self.cleared + amount,
            ..self
        })
    }

    /// Reserve spendable funds for a payout.
    pub fn lock(self, amount: i64) -> Result<Self, BalanceError> {
        positive(amount)?;
        if amount > self.available() {
            return Err(BalanceError::InsufficientFunds);
        }
        Ok(Self {
            locked: self.locked + amount,
            ..self
        })
    }

    /// Release a reservation without moving money.
    pub fn unlock(self, amount: i64) -> Result<Self, BalanceError> {
        positive(amount)?;
        if amount > self.locked {
            return Err(BalanceError::ExceedsLocked);
        }
        Ok(Self {
            locked: self.locked - amount,
            ..self
        })
    }

    /// Take reserved funds out of the wallet once a payout has gone through.
    pub fn settle_locked(self, amount: i64) -> Result<Self, BalanceError> {
        positive(amount)?;
        if amount > self.locked {
            return Err(BalanceError::ExceedsLocked);
        }
        Ok(Self {
            balance: self.balance - amount,
            cleared: self.cleared - amount,
            locked: self.locked - amount,
        })
    }

    /// Take spendable funds out directly, without a prior reservation.
    pub fn debit(self, amount: i64) -> Result<Self, BalanceError> {
        positive(amount)?;
        if amount > self.available() {
            return Err(BalanceError::InsufficientFunds);
        }
        Ok(Self {
            balance: self.balance - amount,
            cleared: self.cleared - amount,
            ..self
        })
    }
}

fn positive(amount: i64) -> Result<(), BalanceError> {
    if amount <= 0 {
        return Err(BalanceError::NonPositiveAmount);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(amount: i64) -> Balances {
        Balances::default().credit(amount, true).unwrap()
    }

    fn ordered(b: Balances) -> bool {
        0 <= b.locked && b.locked <= b.cleared && b.cleared <= b.balance
    }

    #[test]
    fn uncleared_credit_is_not_spendable_until_cleared() {
        let b = Balances::default().credit(10_000, false).unwrap();
        assert_eq!(b.balance, 10_000);
        assert_eq!(b.available(), 0);
        assert_eq!(b.lock(1), Err(BalanceError::InsufficientFunds));

        let b = b.clear(10_000).unwrap();
        assert_eq!(b.available(), 10_000);
        assert_eq!(b.uncleared(), 0);
    }

    #[test]
    fn cannot_clear_more_than_uncleared() {
        let b = funded(5_000).credit(1_000, false).unwrap();
        assert_eq!(b.clear(1_001), Err(BalanceError::ExceedsUncleared));
        assert!(b.clear(1_000).is_ok());
    }

    #[test]
    fn payout_lifecycle_lock_then_settle() {
        let b = funded(10_000).lock(7_550).unwrap();
        assert_eq!(b.available(), 2_450);
        assert_eq!(b.balance, 10_000);

        let b = b.settle_locked(7_550).unwrap();
        assert_eq!(b, Balances { balance: 2_450, cleared: 2_450, locked: 0 });
    }

    #[test]
    fn failed_payout_unlock_restores_availability() {
        let b = funded(10_000).lock(4_000).unwrap().unlock(4_000).unwrap();
        assert_eq!(b, funded(10_000));
    }

    #[test]
    fn locked_funds_cannot_be_double_spent() {
        let b = funded(10_000).lock(8_000).unwrap();
        assert_eq!(b.lock(2_001), Err(BalanceError::InsufficientFunds));
        assert_eq!(b.debit(2_001), Err(BalanceError::InsufficientFunds));
        assert!(b.debit(2_000).is_ok());
    }

    #[test]
    fn cannot_release_more_than_locked() {
        let b = funded(10_000).lock(100).unwrap();
        assert_eq!(b.unlock(101), Err(BalanceError::ExceedsLocked));
        assert_eq!(b.settle_locked(101), Err(BalanceError::ExceedsLocked));
    }

    #[test]
    fn non_positive_amounts_are_refused() {
        let b = funded(100);
        assert_eq!(b.credit(0, true), Err(BalanceError::NonPositiveAmount));
        assert_eq!(b.debit(-5), Err(BalanceError::NonPositiveAmount));
        assert_eq!(b.lock(0), Err(BalanceError::NonPositiveAmount));
    }

    #[test]
    fn overflow_is_reported() {
        let b = Balances { balance: i64::MAX, cleared: i64::MAX, locked: 0 };
        assert_eq!(b.credit(1, true), Err(BalanceError::Overflow));
    }

    #[test]
    fn ordering_survives_a_mixed_sequence() {
        let mut b = Balances::default();
        let steps: Vec<Box<dyn Fn(Balances) -> Result<Balances, BalanceError>>> = vec![
            Box::new(|b| b.credit(50_000, false)),
            Box::new(|b| b.credit(20_000, true)),
            Box::new(|b| b.lock(15_000)),
            Box::new(|b| b.clear(30_000)),
            Box::new(|b| b.lock(35_000)),
            Box::new(|b| b.settle_locked(15_000)),
            Box::new(|b| b.unlock(35_000)),
            Box::new(|b| b.debit(35_000)),
        ];
        for step in steps {
            b = step(b).unwrap();
            assert!(ordered(b), "{b:?}");
        }
        assert_eq!(b, Balances { balance: 20_000, cleared: 0, locked: 0 });
    }

    #[test]
    fn reconciliation_flags_drift() {
        let now = Utc::now();
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            currency: "NGN".into(),
            balance_cents: 10_000,
            cleared_balance_cents: 8_000,
            locked_balance_cents: 1_000,
            created_at: now,
            updated_at: now,
        };
        let report = |ledger: i64| WalletReconciliation {
            wallet_id: wallet.id,
            balance_cents: wallet.balance_cents,
            ledger_balance_cents: ledger,
            uncleared_ledger_cents: 2_000,
            in_flight_payout_cents: 1_000,
            consistent: false,
        };

        assert!(report(10_000).check(&wallet).consistent);
        assert!(!report(9_999).check(&wallet).consistent);
    }

    #[test]
    fn insufficient_funds_maps_to_insufficient_balance() {
        assert!(matches!(
            AppError::from(BalanceError::InsufficientFunds),
            AppError::InsufficientBalance
        ));
    }
}
