//! Fee rules.
//!
//! One rule per operation. Percentages are expressed in basis points
//! (100 bp = 1%) and always round up to the next minor unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

text_enum! {
    pub enum FeeOperation {
        Payout => "payout",
        Deposit => "deposit",
    }
}

text_enum! {
    pub enum FeeType {
        /// Fixed `flat_cents`
        Flat => "flat",
        /// `max(amount * bp, min_fee)`
        Percent => "percent",
        /// `flat_cents + max(amount * bp, min_fee)`
        Mixed => "mixed",
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FeeRule {
    #[sqlx(try_from = "String")]
    pub operation: FeeOperation,

    #[sqlx(try_from = "String")]
    pub fee_type: FeeType,

    pub flat_cents: i64,

    pub percent_bp: i32,

    /// Floor applied to the percentage part
    pub min_fee_cents: i64,

    /// Cap applied to the final fee
    pub max_fee_cents: Option<i64>,

    pub is_active: bool,

    pub updated_at: DateTime<Utc>,
}

impl FeeRule {
    /// Fee charged on `amount_cents`. Inactive rules charge nothing.
    pub fn compute(&self, amount_cents: i64) -> i64 {
        if !self.is_active || amount_cents <= 0 {
            return 0;
        }

        let percent = || percent_of(amount_cents, self.percent_bp).max(self.min_fee_cents);
        let fee = match self.fee_type {
            FeeType::Flat => self.flat_cents,
            FeeType::Percent => percent(),
            FeeType::Mixed => self.flat_cents.saturating_add(percent()),
        };

        match self.max_fee_cents {
            Some(max) => fee.min(max),
            None => fee,
        }
    }
}

/// Fee for an operation, treating a missing rule as free.
pub fn fee_for(rule: Option<&FeeRule>, amount_cents: i64) -> i64 {
    rule.map_or(0, |r| r.compute(amount_cents))
}

/// `ceil(amount * bp / 10_000)` without intermediate overflow.
fn percent_of(amount_cents: i64, bp: i32) -> i64 {
    let raw = (i128::from(amount_cents) * i128::from(bp) + 9_999) / 10_000;
    i64::try_from(raw).unwrap_or(i64::MAX)
}

/// Request body for `PUT /admin/fee-rules/{operation}`.
#[derive(Debug, Deserialize)]
pub struct UpsertFeeRuleRequest {
    pub fee_type: FeeType,
    #[serde(default)]
    pub flat_cents: i64,
    #[serde(default)]
    pub percent_bp: i32,
    #[serde(default)]
    pub min_fee_cents: i64,
    pub max_fee_cents: Option<i64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl UpsertFeeRuleRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.flat_cents < 0 || self.min_fee_cents < 0 {
            return Err(AppError::InvalidRequest(
                "Fee amounts cannot be negative".to_string(),
            ));
        }
        if !(0..=10_000).contains(&self.percent_bp) {
            return Err(AppError::InvalidRequest(
                "percent_bp must be between 0 and 10000".to_string(),
            ));
        }
        if let Some(max) = self.max_fee_cents {
            if max < 0 {
                return Err(AppError::InvalidRequest(
                    "max_fee_cents cannot be negative".to_string(),
                ));
            }
            if self.fee_type != FeeType::Flat && max < self.min_fee_cents {
                return Err(AppError::InvalidRequest(
                    "max_fee_cents must not be below min_fee_cents".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(fee_type: FeeType) -> FeeRule {
        FeeRule {
            operation: FeeOperation::Payout,
            fee_type,
            flat_cents: 1_000,
            percent_bp: 150,
            min_fee_cents: 500,
            max_fee_cents: None,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn flat_fee_ignores_amount() {
        let r = rule(FeeType::Flat);
        assert_eq!(r.compute(1), 1_000);
        assert_eq!(r.compute(10_000_000), 1_000);
    }

    #[test]
    fn percent_fee_rounds_up_and_respects_floor() {
        let r = rule(FeeType::Percent);
        // 1.5% of 100_000 = 1_500
        assert_eq!(r.compute(100_000), 1_500);
        // 1.5% of 100_001 = 1_500.015 -> 1_501
        assert_eq!(r.compute(100_001), 1_501);
        // 1.5% of 10_000 = 150, below the 500 floor
        assert_eq!(r.compute(10_000), 500);
    }

    #[test]
    fn mixed_fee_adds_flat_and_percent() {
        let r = rule(FeeType::Mixed);
        assert_eq!(r.compute(100_000), 2_500);
        assert_eq!(r.compute(10_000), 1_500);
    }

    #[test]
    fn cap_applies_to_final_fee() {
        let mut r = rule(FeeType::Mixed);
        r.max_fee_cents = Some(2_000);
        assert_eq!(r.compute(1_000_000), 2_000);
    }

    #[test]
    fn inactive_or_missing_rule_is_free() {
        let mut r = rule(FeeType::Flat);
        r.is_active = false;
        assert_eq!(r.compute(100_000), 0);
        assert_eq!(fee_for(None, 100_000), 0);
    }

    #[test]
    fn huge_amounts_do_not_overflow() {
        let mut r = rule(FeeType::Percent);
        r.percent_bp = 10_000;
        assert_eq!(r.compute(i64::MAX), i64::MAX);
    }

    #[test]
    fn upsert_validation() {
        let ok = UpsertFeeRuleRequest {
            fee_type: FeeType::Percent,
            flat_cents: 0,
            percent_bp: 150,
            min_fee_cents: 500,
            max_fee_cents: Some(5_000),
            is_active: true,
        };
        assert!(ok.validate().is_ok());

        let bad_bp = UpsertFeeRuleRequest { percent_bp: 10_001, ..ok };
        assert!(bad_bp.validate().is_err());

        let cap_below_floor = UpsertFeeRuleRequest {
            fee_type: FeeType::Percent,
            flat_cents: 0,
            percent_bp: 150,
            min_fee_cents: 500,
            max_fee_cents: Some(100),
            is_active: true,
        };
        assert!(cap_below_floor.validate().is_err());
    }
}
