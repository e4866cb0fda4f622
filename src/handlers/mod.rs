//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls into a service for the business logic
//! 3. Returns HTTP response (JSON, status code)

/// Admin console endpoints
pub mod admin;
/// Service health endpoint
pub mod health;
/// End-user KYC submissions
pub mod kyc;
/// Signup and profile
pub mod onboarding;
/// Outbound payouts
pub mod payouts;
/// Virtual account issuance
pub mod virtual_accounts;
/// Wallet balances and ledger
pub mod wallet;
/// Inbound processor webhooks
pub mod webhooks;
