//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::partner::PartnerError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Invalid API keys, bad webhook signatures, missing privileges
/// - **Resource Errors**: Requested resources not found
/// - **Business Logic Errors**: Operations that violate balance, KYC or risk rules
/// - **Upstream Errors**: The banking partner rejected or failed a request
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Inbound webhook signature is missing or does not match.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Authenticated caller lacks the role required for the route.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Insufficient privileges")]
    Forbidden,

    /// The user or its tenant is suspended or closed.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Account is not active")]
    AccountInactive,

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Wallet not found")]
    WalletNotFound,

    #[error("Virtual account not found")]
    VirtualAccountNotFound,

    #[error("Payout not found")]
    PayoutNotFound,

    #[error("KYC submission not found")]
    KycSubmissionNotFound,

    #[error("Risk rule not found")]
    RiskRuleNotFound,

    #[error("Webhook event not found")]
    WebhookEventNotFound,

    /// Wallet does not hold enough available funds.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// The user's KYC level is below what the operation requires.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("KYC level {current} is below the required level {required}")]
    KycLevelTooLow { required: i16, current: i16 },

    /// A payout was blocked by an active risk rule.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Blocked by risk rule: {0}")]
    RiskRuleViolation(String),

    /// A record cannot move from its current state to the requested one.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Cannot move from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The request clashes with existing data (duplicate email, reused reference, ...).
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Conflict")]
    Conflict(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// The banking partner rejected or failed a request.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Banking partner error: {0}")]
    Partner(#[from] PartnerError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key"),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::AccountInactive => (StatusCode::FORBIDDEN, "account_inactive"),
            AppError::TenantNotFound => (StatusCode::NOT_FOUND, "tenant_not_found"),
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "user_not_found"),
            AppError::WalletNotFound => (StatusCode::NOT_FOUND, "wallet_not_found"),
            AppError::VirtualAccountNotFound => {
                (StatusCode::NOT_FOUND, "virtual_account_not_found")
            }
            AppError::PayoutNotFound => (StatusCode::NOT_FOUND, "payout_not_found"),
            AppError::KycSubmissionNotFound => {
                (StatusCode::NOT_FOUND, "kyc_submission_not_found")
            }
            AppError::RiskRuleNotFound => (StatusCode::NOT_FOUND, "risk_rule_not_found"),
            AppError::WebhookEventNotFound => (StatusCode::NOT_FOUND, "webhook_event_not_found"),
            AppError::InsufficientBalance => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_balance")
            }
            AppError::KycLevelTooLow { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "kyc_level_too_low")
            }
            AppError::RiskRuleViolation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "risk_rule_violation")
            }
            AppError::InvalidStateTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_state_transition")
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Partner(_) => (StatusCode::BAD_GATEWAY, "partner_error"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Database errors are logged and replaced by a generic message so that
/// internal details never reach the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::InvalidRequest(msg) | AppError::Conflict(msg) => msg.clone(),
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "An internal error occurred".to_string()
            }
            AppError::Partner(e) => {
                tracing::warn!(error = %e, "banking partner error");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_category() {
        let cases = [
            (AppError::InvalidApiKey, StatusCode::UNAUTHORIZED),
            (AppError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::PayoutNotFound, StatusCode::NOT_FOUND),
            (AppError::InsufficientBalance, StatusCode::UNPROCESSABLE_ENTITY),
            (
                AppError::KycLevelTooLow { required: 2, current: 1 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Partner(PartnerError::Unavailable("timeout".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn kyc_message_names_both_levels() {
        let err = AppError::KycLevelTooLow { required: 2, current: 0 };
        assert_eq!(err.to_string(), "KYC level 0 is below the required level 2");
    }
}
