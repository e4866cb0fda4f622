//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and complex operations.

pub mod audit_service;
pub mod fee_service;
pub mod kyc_service;
pub mod onboarding_service;
pub mod payout_service;
pub mod risk_service;
pub mod settlement_service;
pub mod virtual_account_service;
pub mod wallet_service;
pub mod webhook_service;
