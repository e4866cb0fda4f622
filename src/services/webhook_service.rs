//! Inbound webhooks from the payment processor.
//!
//! This module handles signature verification, idempotent event storage
//! and dispatch of deposit and transfer notifications to the wallet and
//! payout services.

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        page,
        webhook::{
            ListWebhookEventsQuery, ProcessorEvent, ProcessorEventKind, WebhookAck, WebhookEvent,
            WebhookEventStatus,
        },
    },
    services::{
        audit_service, payout_service,
        wallet_service::{self, DepositOutcome},
    },
};

type HmacSha256 = Hmac<Sha256>;

/// Verify the processor's HMAC-SHA256 signature over the raw request body.
///
/// # Format
///
/// `sha256=<hex>` or bare `<hex>`. The comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), AppError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(AppError::InvalidSignature)?;
    let hex_signature = header.strip_prefix("sha256=").unwrap_or(header);
    let expected = hex::decode(hex_signature).map_err(|_| AppError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AppError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| AppError::InvalidSignature)
}

/// Store and process one processor notification.
///
/// # Process
///
/// 1. Parse the `{ id, event, data }` envelope
/// 2. Insert into `webhook_events`, keyed by the processor's event id
/// 3. Acknowledge redeliveries of handled events without reprocessing
/// 4. Dispatch and record the outcome
///
/// A processing error marks the event `failed` and is returned, so the
/// processor sees a non-2xx response and retries.
pub async fn ingest(
    pool: &DbPool,
    require_settlement: bool,
    body: &[u8],
) -> Result<WebhookAck, AppError> {
    let event: ProcessorEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("Malformed webhook payload: {}", e)))?;
    if event.id.trim().is_empty() {
        return Err(AppError::InvalidRequest("Webhook event id is required".to_string()));
    }

    let payload = serde_json::to_value(&event)
        .map_err(|e| AppError::InvalidRequest(format!("Malformed webhook payload: {}", e)))?;

    let inserted = sqlx::query_as::<_, WebhookEvent>(
        r#"
        INSERT INTO webhook_events (event_id, event_type, payload)
        VALUES ($1, $2, $3)
        ON CONFLICT (event_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(&event.id)
    .bind(&event.event)
    .bind(payload)
    .fetch_optional(pool)
    .await?;

    let stored = match inserted {
        Some(stored) => stored,
        None => {
            let existing = sqlx::query_as::<_, WebhookEvent>(
                "SELECT * FROM webhook_events WHERE event_id = $1",
            )
            .bind(&event.id)
            .fetch_one(pool)
            .await?;

            if let Some(ack) = redelivery_ack(&existing) {
                tracing::debug!(event_id = %existing.event_id, "duplicate webhook acknowledged");
                return Ok(ack);
            }
            existing
        }
    };

    let processed = process_stored(pool, require_settlement, stored).await?;

    Ok(WebhookAck {
        event_id: processed.event_id,
        status: processed.status,
        duplicate: false,
    })
}

/// Acknowledgement for a redelivered event that was already handled.
///
/// `None` means the stored event failed or never finished and should be
/// processed again.
fn redelivery_ack(existing: &WebhookEvent) -> Option<WebhookAck> {
    existing.status.is_settled().then(|| WebhookAck {
        event_id: existing.event_id.clone(),
        status: existing.status,
        duplicate: true,
    })
}

/// Re-run a stored event that failed or never finished.
pub async fn replay(
    pool: &DbPool,
    require_settlement: bool,
    actor: Uuid,
    id: Uuid,
) -> Result<WebhookEvent, AppError> {
    let stored = sqlx::query_as::<_, WebhookEvent>("SELECT * FROM webhook_events WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::WebhookEventNotFound)?;

    if stored.status.is_settled() {
        return Err(AppError::InvalidStateTransition {
            from: stored.status.to_string(),
            to: WebhookEventStatus::Processed.to_string(),
        });
    }

    audit_service::record(
        pool,
        Some(actor),
        "webhook_event.replay",
        "webhook_event",
        stored.id,
        json!({ "event_id": stored.event_id, "attempts": stored.attempts }),
    )
    .await?;

    process_stored(pool, require_settlement, stored).await
}

pub async fn list_events(
    pool: &DbPool,
    query: &ListWebhookEventsQuery,
) -> Result<Vec<WebhookEvent>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let events = sqlx::query_as::<_, WebhookEvent>(
        r#"
        SELECT * FROM webhook_events
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY received_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(query.status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(events)
}

/// Dispatch a stored event and write back its outcome.
async fn process_stored(
    pool: &DbPool,
    require_settlement: bool,
    stored: WebhookEvent,
) -> Result<WebhookEvent, AppError> {
    let outcome = match serde_json::from_value::<ProcessorEvent>(stored.payload.clone()) {
        Ok(event) => dispatch(pool, require_settlement, &event).await,
        Err(e) => Err(AppError::InvalidRequest(format!("Malformed webhook payload: {}", e))),
    };

    match outcome {
        Ok(status) => {
            let updated = sqlx::query_as::<_, WebhookEvent>(
                r#"
                UPDATE webhook_events
                SET status = $1, error = NULL, attempts = attempts + 1, processed_at = NOW()
                WHERE id = $2
                RETURNING *
                "#,
            )
            .bind(status.as_str())
            .bind(stored.id)
            .fetch_one(pool)
            .await?;

            tracing::info!(
                event_id = %updated.event_id,
                event_type = %updated.event_type,
                status = %updated.status,
                "webhook handled"
            );
            Ok(updated)
        }
        Err(err) => {
            sqlx::query(
                r#"
                UPDATE webhook_events
                SET status = $1, error = $2, attempts = attempts + 1
                WHERE id = $3
                "#,
            )
            .bind(WebhookEventStatus::Failed.as_str())
            .bind(err.to_string())
            .bind(stored.id)
            .execute(pool)
            .await?;

            tracing::warn!(
                event_id = %stored.event_id,
                event_type = %stored.event_type,
                error = %err,
                "webhook processing failed"
            );
            Err(err)
        }
    }
}

async fn dispatch(
    pool: &DbPool,
    require_settlement: bool,
    event: &ProcessorEvent,
) -> Result<WebhookEventStatus, AppError> {
    let kind = event
        .kind()
        .map_err(|e| AppError::InvalidRequest(format!("Malformed {} data: {}", event.event, e)))?;

    match kind {
        ProcessorEventKind::DepositReceived(deposit) => {
            match wallet_service::credit_deposit(pool, &deposit, require_settlement).await? {
                DepositOutcome::Credited(entry) => {
                    tracing::debug!(ledger_entry_id = %entry.id, "deposit entry written");
                }
                DepositOutcome::Duplicate(entry) => {
                    tracing::info!(
                        ledger_entry_id = %entry.id,
                        reference = %deposit.reference,
                        "deposit already credited under another event id"
                    );
                }
            }
        }
        ProcessorEventKind::TransferSucceeded(transfer) => {
            payout_service::complete_payout(
                pool,
                &transfer.reference,
                transfer.provider_reference.as_deref(),
            )
            .await?;
        }
        ProcessorEventKind::TransferFailed(transfer)
        | ProcessorEventKind::TransferReversed(transfer) => {
            payout_service::fail_payout(pool, &transfer.reference, transfer.reason.as_deref())
                .await?;
        }
        ProcessorEventKind::Unsupported => {
            tracing::debug!(event_type = %event.event, "ignoring unsupported webhook event");
            return Ok(WebhookEventStatus::Ignored);
        }
    }

    Ok(WebhookEventStatus::Processed)
}

/// Sign a body the way the processor does.
#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","event":"deposit.received","data":{}}"#;

    #[test]
    fn accepts_prefixed_signature() {
        let signature = sign(SECRET, BODY);
        assert!(verify_signature(SECRET, BODY, Some(&signature)).is_ok());
    }

    #[test]
    fn accepts_bare_hex_signature() {
        let signature = sign(SECRET, BODY);
        let bare = signature.trim_start_matches("sha256=");
        assert!(verify_signature(SECRET, BODY, Some(bare)).is_ok());
    }

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(
            verify_signature(SECRET, BODY, None),
            Err(AppError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature(SECRET, BODY, Some("  ")),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let signature = sign("another_secret", BODY);
        assert!(verify_signature(SECRET, BODY, Some(&signature)).is_err());
    }

    #[test]
    fn rejects_tampered_body() {
        let signature = sign(SECRET, BODY);
        let tampered = br#"{"id":"evt_1","event":"deposit.received","data":{"amount_cents":1}}"#;
        assert!(verify_signature(SECRET, tampered, Some(&signature)).is_err());
    }

    #[test]
    fn rejects_non_hex_signature() {
        assert!(verify_signature(SECRET, BODY, Some("sha256=not-hex")).is_err());
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let signature = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            signature,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    fn stored(status: WebhookEventStatus) -> WebhookEvent {
        WebhookEvent {
            id: Uuid::new_v4(),
            event_id: "evt_1".to_string(),
            event_type: "deposit.received".to_string(),
            payload: serde_json::json!({}),
            status,
            error: None,
            attempts: 1,
            received_at: chrono::Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn handled_events_are_acknowledged_without_reprocessing() {
        for status in [WebhookEventStatus::Processed, WebhookEventStatus::Ignored] {
            let ack = redelivery_ack(&stored(status)).unwrap();
            assert_eq!(
                ack,
                WebhookAck {
                    event_id: "evt_1".to_string(),
                    status,
                    duplicate: true,
                }
            );
        }
    }

    #[test]
    fn failed_or_unfinished_events_are_processed_again() {
        assert!(redelivery_ack(&stored(WebhookEventStatus::Failed)).is_none());
        assert!(redelivery_ack(&stored(WebhookEventStatus::Received)).is_none());
    }
}

