//! Audit trail for admin and system actions.
//!
//! Writers pass the same executor as the mutation they describe, so the audit
//! row commits or rolls back together with it.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        audit_log::{AuditLog, ListAuditLogsQuery},
        page,
    },
};

/// Append one audit record.
///
/// `actor` is `None` for actions the platform takes on its own.
pub async fn record<'e, E>(
    executor: E,
    actor: Option<Uuid>,
    action: &str,
    entity_type: &str,
    entity_id: impl ToString,
    details: serde_json::Value,
) -> Result<(), AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_logs (actor_user_id, action, entity_type, entity_id, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(actor)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id.to_string())
    .bind(details)
    .execute(executor)
    .await?;

    Ok(())
}

/// List audit records, newest first, with optional filters.
pub async fn list(pool: &DbPool, query: &ListAuditLogsQuery) -> Result<Vec<AuditLog>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let logs = sqlx::query_as::<_, AuditLog>(
        r#"
        SELECT * FROM audit_logs
        WHERE ($1::text IS NULL OR entity_type = $1)
          AND ($2::text IS NULL OR entity_id = $2)
          AND ($3::uuid IS NULL OR actor_user_id = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(query.entity_type.as_deref())
    .bind(query.entity_id.as_deref())
    .bind(query.actor_user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(logs)
}
