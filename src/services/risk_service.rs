//! Risk rule administration and payout screening.

use chrono::{Timelike, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        risk_rule::{
            CreateRiskRuleRequest, PayoutRiskContext, RiskRule, UpdateRiskRuleRequest, evaluate,
            validate_threshold,
        },
        user::{MAX_KYC_LEVEL, User},
    },
    services::audit_service,
};

pub async fn list(pool: &DbPool) -> Result<Vec<RiskRule>, AppError> {
    let rules = sqlx::query_as::<_, RiskRule>("SELECT * FROM risk_rules ORDER BY created_at")
        .fetch_all(pool)
        .await?;

    Ok(rules)
}

pub async fn create(
    pool: &DbPool,
    actor: Uuid,
    request: CreateRiskRuleRequest,
) -> Result<RiskRule, AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Rule name is required".to_string()));
    }
    validate_threshold(request.kind, request.threshold)?;
    if request
        .kyc_level
        .is_some_and(|level| !(0..=MAX_KYC_LEVEL).contains(&level))
    {
        return Err(AppError::InvalidRequest(format!(
            "kyc_level must be between 0 and {}",
            MAX_KYC_LEVEL
        )));
    }

    let mut tx = pool.begin().await?;

    let rule = sqlx::query_as::<_, RiskRule>(
        r#"
        INSERT INTO risk_rules (name, kind, kyc_level, threshold)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(request.kind.as_str())
    .bind(request.kyc_level)
    .bind(request.threshold)
    .fetch_one(&mut *tx)
    .await?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "risk_rule.create",
        "risk_rule",
        rule.id,
        json!(rule),
    )
    .await?;

    tx.commit().await?;

    Ok(rule)
}

pub async fn update(
    pool: &DbPool,
    actor: Uuid,
    rule_id: Uuid,
    request: UpdateRiskRuleRequest,
) -> Result<RiskRule, AppError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, RiskRule>("SELECT * FROM risk_rules WHERE id = $1 FOR UPDATE")
        .bind(rule_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::RiskRuleNotFound)?;

    let name = match request.name.as_deref().map(str::trim) {
        Some("") => {
            return Err(AppError::InvalidRequest("Rule name is required".to_string()));
        }
        Some(name) => name.to_string(),
        None => current.name.clone(),
    };
    let threshold = request.threshold.unwrap_or(current.threshold);
    validate_threshold(current.kind, threshold)?;
    let is_active = request.is_active.unwrap_or(current.is_active);

    let rule = sqlx::query_as::<_, RiskRule>(
        r#"
        UPDATE risk_rules
        SET name = $1, threshold = $2, is_active = $3, updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(threshold)
    .bind(is_active)
    .bind(rule_id)
    .fetch_one(&mut *tx)
    .await?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "risk_rule.update",
        "risk_rule",
        rule.id,
        json!({ "before": current, "after": rule }),
    )
    .await?;

    tx.commit().await?;

    Ok(rule)
}

pub async fn delete(pool: &DbPool, actor: Uuid, rule_id: Uuid) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query_as::<_, RiskRule>("DELETE FROM risk_rules WHERE id = $1 RETURNING *")
        .bind(rule_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::RiskRuleNotFound)?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "risk_rule.delete",
        "risk_rule",
        deleted.id,
        json!(deleted),
    )
    .await?;

    tx.commit().await?;

    Ok(())
}

/// Screen a prospective payout against the active rules.
///
/// Daily counters run from UTC midnight and ignore payouts that failed or
/// were reversed.
pub async fn check_payout(pool: &DbPool, user: &User, amount_cents: i64) -> Result<(), AppError> {
    let rules = sqlx::query_as::<_, RiskRule>("SELECT * FROM risk_rules WHERE is_active")
        .fetch_all(pool)
        .await?;
    if rules.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let day_start = now
        .with_hour(0)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let (daily_volume_cents, daily_count): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0)::BIGINT, COUNT(*)
        FROM payouts
        WHERE user_id = $1
          AND created_at >= $2
          AND status NOT IN ('failed', 'reversed')
        "#,
    )
    .bind(user.id)
    .bind(day_start)
    .fetch_one(pool)
    .await?;

    let ctx = PayoutRiskContext {
        kyc_level: user.kyc_level,
        amount_cents,
        daily_volume_cents,
        daily_count,
    };

    evaluate(&rules, &ctx).inspect_err(|e| {
        tracing::warn!(user_id = %user.id, amount_cents, error = %e, "payout blocked by risk rules");
    })
}
