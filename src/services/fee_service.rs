//! Fee rule storage and fee quotes.

use serde_json::json;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        fee_rule::{FeeOperation, FeeRule, UpsertFeeRuleRequest, fee_for},
        payout::PayoutQuote,
    },
    services::{audit_service, wallet_service},
};

pub async fn get_rule<'e, E>(executor: E, operation: FeeOperation) -> Result<Option<FeeRule>, AppError>
where
    E: PgExecutor<'e>,
{
    let rule = sqlx::query_as::<_, FeeRule>("SELECT * FROM fee_rules WHERE operation = $1")
        .bind(operation.as_str())
        .fetch_optional(executor)
        .await?;

    Ok(rule)
}

pub async fn list_rules(pool: &DbPool) -> Result<Vec<FeeRule>, AppError> {
    let rules = sqlx::query_as::<_, FeeRule>("SELECT * FROM fee_rules ORDER BY operation")
        .fetch_all(pool)
        .await?;

    Ok(rules)
}

/// Create or replace the rule for `operation`.
pub async fn upsert_rule(
    pool: &DbPool,
    actor: Uuid,
    operation: FeeOperation,
    request: UpsertFeeRuleRequest,
) -> Result<FeeRule, AppError> {
    request.validate()?;

    let mut tx = pool.begin().await?;

    let rule = sqlx::query_as::<_, FeeRule>(
        r#"
        INSERT INTO fee_rules (
            operation, fee_type, flat_cents, percent_bp, min_fee_cents, max_fee_cents, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (operation) DO UPDATE SET
            fee_type = EXCLUDED.fee_type,
            flat_cents = EXCLUDED.flat_cents,
            percent_bp = EXCLUDED.percent_bp,
            min_fee_cents = EXCLUDED.min_fee_cents,
            max_fee_cents = EXCLUDED.max_fee_cents,
            is_active = EXCLUDED.is_active,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(operation.as_str())
    .bind(request.fee_type.as_str())
    .bind(request.flat_cents)
    .bind(request.percent_bp)
    .bind(request.min_fee_cents)
    .bind(request.max_fee_cents)
    .bind(request.is_active)
    .fetch_one(&mut *tx)
    .await?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "fee_rule.upsert",
        "fee_rule",
        operation,
        json!(rule),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(operation = %operation, fee_type = %rule.fee_type, "fee rule updated");

    Ok(rule)
}

/// Preview what a payout of `amount_cents` would cost the user.
pub async fn quote_payout(
    pool: &DbPool,
    user_id: Uuid,
    amount_cents: i64,
) -> Result<PayoutQuote, AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidRequest("Amount must be positive".to_string()));
    }

    let wallet = wallet_service::get_wallet_for_user(pool, user_id).await?;
    let rule = get_rule(pool, FeeOperation::Payout).await?;
    let fee_cents = fee_for(rule.as_ref(), amount_cents);

    Ok(PayoutQuote {
        amount_cents,
        fee_cents,
        total_cents: amount_cents.saturating_add(fee_cents),
        currency: wallet.currency,
    })
}
