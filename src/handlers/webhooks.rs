//! Inbound webhook endpoint for the payment processor.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use crate::{
    error::AppError,
    models::webhook::{SIGNATURE_HEADER, WebhookAck},
    services::webhook_service,
    state::AppState,
};

/// Receive a processor notification.
///
/// # Endpoint
///
/// `POST /webhooks/processor`
///
/// # Authentication
///
/// No API key. The body must carry a valid `X-Processor-Signature`
/// (HMAC-SHA256 of the raw body with the shared secret); anything else gets
/// 401 and is not stored.
///
/// # Response
///
/// - **200 OK**: `{ "event_id": "evt_01HZX3", "status": "processed", "duplicate": false }`
/// - **400**: body is not a valid event envelope
/// - **4xx/5xx**: processing failed; the event is stored as `failed` and the
///   processor is expected to retry
pub async fn processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    webhook_service::verify_signature(&state.config.processor_webhook_secret, &body, signature)
        .inspect_err(|_| tracing::warn!("rejected webhook with missing or invalid signature"))?;

    let ack = webhook_service::ingest(&state.pool, state.config.deposits_require_settlement, &body)
        .await?;

    Ok(Json(ack))
}
