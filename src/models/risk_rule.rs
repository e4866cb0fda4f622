//! Payout risk rules.
//!
//! Rules are evaluated before a payout reserves funds. A rule with a
//! `kyc_level` only applies to users at exactly that level; without one it
//! applies to everyone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

text_enum! {
    pub enum RiskRuleKind {
        /// `threshold` is the largest single payout amount
        MaxSinglePayout => "max_single_payout",
        /// `threshold` caps the sum of today's payout amounts
        DailyPayoutVolume => "daily_payout_volume",
        /// `threshold` caps the number of payouts created today
        DailyPayoutCount => "daily_payout_count",
        /// `threshold` is the minimum KYC level allowed to pay out
        MinKycLevel => "min_kyc_level",
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RiskRule {
    pub id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub kind: RiskRuleKind,
    pub kyc_level: Option<i16>,
    pub threshold: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the rules look at for a prospective payout.
#[derive(Debug, Clone, Copy)]
pub struct PayoutRiskContext {
    pub kyc_level: i16,
    pub amount_cents: i64,
    /// Sum of today's non-failed payouts, excluding this one
    pub daily_volume_cents: i64,
    /// Count of today's non-failed payouts, excluding this one
    pub daily_count: i64,
}

impl RiskRule {
    pub fn applies_to(&self, kyc_level: i16) -> bool {
        self.is_active && self.kyc_level.is_none_or(|level| level == kyc_level)
    }

    pub fn check(&self, ctx: &PayoutRiskContext) -> Result<(), AppError> {
        let violated = match self.kind {
            RiskRuleKind::MaxSinglePayout => ctx.amount_cents > self.threshold,
            RiskRuleKind::DailyPayoutVolume => {
                ctx.daily_volume_cents.saturating_add(ctx.amount_cents) > self.threshold
            }
            RiskRuleKind::DailyPayoutCount => ctx.daily_count.saturating_add(1) > self.threshold,
            RiskRuleKind::MinKycLevel => {
                if i64::from(ctx.kyc_level) < self.threshold {
                    return Err(AppError::KycLevelTooLow {
                        required: i16::try_from(self.threshold).unwrap_or(i16::MAX),
                        current: ctx.kyc_level,
                    });
                }
                false
            }
        };

        if violated {
            return Err(AppError::RiskRuleViolation(format!(
                "{} ({} limit {})",
                self.name, self.kind, self.threshold
            )));
        }
        Ok(())
    }
}

/// Check every applicable rule; the first violation wins.
pub fn evaluate(rules: &[RiskRule], ctx: &PayoutRiskContext) -> Result<(), AppError> {
    rules
        .iter()
        .filter(|rule| rule.applies_to(ctx.kyc_level))
        .try_for_each(|rule| rule.check(ctx))
}

/// Request body for `POST /admin/risk-rules`.
#[derive(Debug, Deserialize)]
pub struct CreateRiskRuleRequest {
    pub name: String,
    pub kind: RiskRuleKind,
    pub kyc_level: Option<i16>,
    pub threshold: i64,
}

/// Request body for `PATCH /admin/risk-rules/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateRiskRuleRequest {
    pub name: Option<String>,
    pub threshold: Option<i64>,
    pub is_active: Option<bool>,
}

pub fn validate_threshold(kind: RiskRuleKind, threshold: i64) -> Result<(), AppError> {
    if threshold < 0 {
        return Err(AppError::InvalidRequest(
            "Threshold cannot be negative".to_string(),
        ));
    }
    if kind == RiskRuleKind::MinKycLevel && threshold > 3 {
        return Err(AppError::InvalidRequest(
            "KYC level threshold must be between 0 and 3".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(kind: RiskRuleKind, threshold: i64, kyc_level: Option<i16>) -> RiskRule {
        RiskRule {
            id: Uuid::new_v4(),
            name: format!("{kind} rule"),
            kind,
            kyc_level,
            threshold,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ctx(kyc_level: i16, amount_cents: i64) -> PayoutRiskContext {
        PayoutRiskContext {
            kyc_level,
            amount_cents,
            daily_volume_cents: 0,
            daily_count: 0,
        }
    }

    #[test]
    fn single_payout_cap_is_inclusive() {
        let r = rule(RiskRuleKind::MaxSinglePayout, 100_000, None);
        assert!(r.check(&ctx(1, 100_000)).is_ok());
        assert!(matches!(
            r.check(&ctx(1, 100_001)),
            Err(AppError::RiskRuleViolation(_))
        ));
    }

    #[test]
    fn daily_volume_counts_todays_payouts() {
        let r = rule(RiskRuleKind::DailyPayoutVolume, 500_000, None);
        let mut c = ctx(1, 200_000);
        c.daily_volume_cents = 300_000;
        assert!(r.check(&c).is_ok());
        c.daily_volume_cents = 300_001;
        assert!(r.check(&c).is_err());
    }

    #[test]
    fn daily_count_includes_the_new_payout() {
        let r = rule(RiskRuleKind::DailyPayoutCount, 3, None);
        let mut c = ctx(1, 1);
        c.daily_count = 2;
        assert!(r.check(&c).is_ok());
        c.daily_count = 3;
        assert!(r.check(&c).is_err());
    }

    #[test]
    fn min_kyc_reports_kyc_error() {
        let r = rule(RiskRuleKind::MinKycLevel, 2, None);
        assert!(matches!(
            r.check(&ctx(1, 1)),
            Err(AppError::KycLevelTooLow { required: 2, current: 1 })
        ));
        assert!(r.check(&ctx(2, 1)).is_ok());
    }

    #[test]
    fn level_scoped_rules_only_hit_that_level() {
        let rules = vec![
            rule(RiskRuleKind::MaxSinglePayout, 50_000, Some(1)),
            rule(RiskRuleKind::MaxSinglePayout, 5_000_000, Some(3)),
        ];
        assert!(evaluate(&rules, &ctx(1, 60_000)).is_err());
        assert!(evaluate(&rules, &ctx(2, 60_000)).is_ok());
        assert!(evaluate(&rules, &ctx(3, 60_000)).is_ok());
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let mut r = rule(RiskRuleKind::MaxSinglePayout, 1, None);
        r.is_active = false;
        assert!(evaluate(&[r], &ctx(0, 1_000_000)).is_ok());
    }

    #[test]
    fn threshold_validation() {
        assert!(validate_threshold(RiskRuleKind::MinKycLevel, 4).is_err());
        assert!(validate_threshold(RiskRuleKind::DailyPayoutCount, -1).is_err());
        assert!(validate_threshold(RiskRuleKind::DailyPayoutVolume, 1_000_000).is_ok());
    }
}
