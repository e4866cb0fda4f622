//! Inbound payment processor webhook models.
//!
//! # Payload
//!
//! ```json
//! {
//!   "id": "evt_01HZX3",
//!   "event": "deposit.received",
//!   "data": {
//!     "reference": "DEP-88213",
//!     "account_number": "9912345678",
//!     "amount_cents": 2500000,
//!     "currency": "NGN",
//!     "sender_name": "Chidi Eze"
//!   }
//! }
//! ```
//!
//! Transfer events (`transfer.success`, `transfer.failed`, `transfer.reversed`)
//! carry `{ "reference", "provider_reference", "reason" }` where `reference` is
//! our payout reference.
//!
//! # Signature
//!
//! The processor sends `X-Processor-Signature: sha256=<hex>` where the hex is
//! HMAC-SHA256(secret, raw_body).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "X-Processor-Signature";

text_enum! {
    pub enum WebhookEventStatus {
        Received => "received",
        Processed => "processed",
        Ignored => "ignored",
        Failed => "failed",
    }
}

impl WebhookEventStatus {
    /// Already handled; redeliveries are acknowledged without reprocessing.
    pub fn is_settled(self) -> bool {
        matches!(self, WebhookEventStatus::Processed | WebhookEventStatus::Ignored)
    }
}

/// Stored inbound event.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    /// Processor's event id; the idempotency key for ingestion
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub status: WebhookEventStatus,
    pub error: Option<String>,
    pub attempts: i32,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Envelope of every processor notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Money arrived in a virtual account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepositNotification {
    /// Processor's reference for the inbound transfer
    pub reference: String,
    pub account_number: String,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub sender_name: Option<String>,
    pub narration: Option<String>,
}

/// Outcome of a payout transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferNotification {
    /// Our payout reference
    pub reference: String,
    pub provider_reference: Option<String>,
    pub reason: Option<String>,
}

/// Typed view of a [`ProcessorEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEventKind {
    DepositReceived(DepositNotification),
    TransferSucceeded(TransferNotification),
    TransferFailed(TransferNotification),
    TransferReversed(TransferNotification),
    Unsupported,
}

impl ProcessorEvent {
    /// Decode `data` according to `event`. Unknown event names are
    /// `Unsupported`; a known name with malformed data is an error.
    pub fn kind(&self) -> Result<ProcessorEventKind, serde_json::Error> {
        let transfer = || serde_json::from_value::<TransferNotification>(self.data.clone());
        Ok(match self.event.as_str() {
            "deposit.received" => {
                ProcessorEventKind::DepositReceived(serde_json::from_value(self.data.clone())?)
            }
            "transfer.success" => ProcessorEventKind::TransferSucceeded(transfer()?),
            "transfer.failed" => ProcessorEventKind::TransferFailed(transfer()?),
            "transfer.reversed" => ProcessorEventKind::TransferReversed(transfer()?),
            _ => ProcessorEventKind::Unsupported,
        })
    }
}

/// Query string for `GET /admin/webhook-events`.
#[derive(Debug, Deserialize)]
pub struct ListWebhookEventsQuery {
    pub status: Option<WebhookEventStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response to the processor.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub event_id: String,
    pub status: WebhookEventStatus,
    /// True when the event had already been handled
    pub duplicate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> ProcessorEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn deposit_event_is_decoded() {
        let e = event(
            r#"{"id":"evt_1","event":"deposit.received","data":{
                "reference":"DEP-1","account_number":"9912345678","amount_cents":2500000,
                "currency":"NGN","sender_name":"Chidi Eze"}}"#,
        );

        match e.kind().unwrap() {
            ProcessorEventKind::DepositReceived(d) => {
                assert_eq!(d.amount_cents, 2_500_000);
                assert_eq!(d.account_number, "9912345678");
                assert_eq!(d.narration, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transfer_events_map_by_name() {
        let data = r#"{"reference":"po-1","provider_reference":"TRF_1"}"#;
        let kinds: Vec<_> = ["transfer.success", "transfer.failed", "transfer.reversed"]
            .iter()
            .map(|name| {
                event(&format!(r#"{{"id":"e","event":"{name}","data":{data}}}"#))
                    .kind()
                    .unwrap()
            })
            .collect();

        assert!(matches!(kinds[0], ProcessorEventKind::TransferSucceeded(_)));
        assert!(matches!(kinds[1], ProcessorEventKind::TransferFailed(_)));
        assert!(matches!(kinds[2], ProcessorEventKind::TransferReversed(ref n) if n.reason.is_none()));
    }

    #[test]
    fn unknown_events_are_unsupported_even_without_data() {
        let e = event(r#"{"id":"evt_2","event":"customer.updated"}"#);
        assert_eq!(e.kind().unwrap(), ProcessorEventKind::Unsupported);
    }

    #[test]
    fn known_event_with_bad_data_is_an_error() {
        let e = event(r#"{"id":"evt_3","event":"deposit.received","data":{"reference":"x"}}"#);
        assert!(e.kind().is_err());
    }

    #[test]
    fn settled_statuses() {
        assert!(WebhookEventStatus::Processed.is_settled());
        assert!(WebhookEventStatus::Ignored.is_settled());
        assert!(!WebhookEventStatus::Failed.is_settled());
        assert!(!WebhookEventStatus::Received.is_settled());
    }
}
