//! Banking partner integration.
//!
//! The partner issues virtual accounts and executes outbound bank transfers.
//! Services depend on the [`BankingPartner`] trait so the HTTP client can be
//! swapped out in tests.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use http::HttpBankingPartner;

/// Errors returned by the banking partner.
///
/// The split matters for payouts: a rejection is definitive and the reserved
/// funds can be released, while an unavailable partner may or may not have
/// accepted the transfer.
#[derive(Debug, thiserror::Error)]
pub enum PartnerError {
    /// The partner answered and refused the request (HTTP 4xx).
    #[error("request rejected by partner: {0}")]
    Rejected(String),

    /// Transport failure, timeout, 5xx or an unreadable response.
    #[error("partner unavailable: {0}")]
    Unavailable(String),
}

/// Request to open a virtual account for a customer.
#[derive(Debug, Clone, Serialize)]
pub struct VirtualAccountRequest {
    /// Our user id, echoed back by the partner on deposit notifications
    pub customer_reference: Uuid,
    pub account_name: String,
    pub email: String,
}

/// Virtual account as issued by the partner.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedVirtualAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    /// Partner's identifier for the account
    pub reference: String,
}

/// Outbound transfer instruction.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    /// Our payout reference; the partner uses it as its idempotency key
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub narration: Option<String>,
}

/// Partner-side state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Pending,
    Success,
    Failed,
    Reversed,
}

/// Transfer status as reported by the partner.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferStatus {
    pub reference: String,
    pub provider_reference: Option<String>,
    pub status: TransferState,
    pub message: Option<String>,
}

/// Operations the platform needs from its banking partner.
#[async_trait]
pub trait BankingPartner: Send + Sync {
    async fn create_virtual_account(
        &self,
        request: &VirtualAccountRequest,
    ) -> Result<IssuedVirtualAccount, PartnerError>;

    async fn initiate_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferStatus, PartnerError>;

    /// Look up a transfer by our payout reference.
    async fn fetch_transfer(&self, reference: &str) -> Result<TransferStatus, PartnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_status_parses_partner_payload() {
        let status: TransferStatus = serde_json::from_str(
            r#"{"reference":"po-1","provider_reference":"TRF_9","status":"success","message":null}"#,
        )
        .unwrap();

        assert_eq!(status.status, TransferState::Success);
        assert_eq!(status.provider_reference.as_deref(), Some("TRF_9"));
    }

    #[test]
    fn unknown_transfer_state_is_rejected() {
        let parsed = serde_json::from_str::<TransferStatus>(
            r#"{"reference":"po-1","status":"queued"}"#,
        );
        assert!(parsed.is_err());
    }
}
