//! HTTP middleware components.
//!
//! Middleware run before route handlers and can short-circuit requests
//! (e.g. reject unauthenticated or unauthorized callers).

/// API key authentication and admin authorization
pub mod auth;
