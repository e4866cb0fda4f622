//! Wallet HTTP handlers.
//!
//! - GET /api/v1/wallet - Balances of the caller's wallet
//! - GET /api/v1/wallet/transactions - The caller's ledger, newest first

use axum::{
    Extension, Json,
    extract::{Query, State},
};

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        ledger::{LedgerEntry, ListEntriesQuery},
        wallet::WalletResponse,
    },
    services::wallet_service,
};

/// Get the caller's wallet.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "user_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
///   "currency": "NGN",
///   "balance_cents": 150000,
///   "cleared_balance_cents": 100000,
///   "locked_balance_cents": 25000,
///   "available_balance_cents": 75000,
///   "updated_at": "2025-12-20T10:00:00Z"
/// }
/// ```
pub async fn get_wallet(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = wallet_service::get_wallet_for_user(&pool, auth.user_id).await?;

    Ok(Json(wallet.into()))
}

/// List ledger entries.
///
/// # Query Parameters
///
/// - `kind`: `deposit`, `payout`, `fee`, `reversal` or `adjustment`
/// - `limit` (default 50, max 200), `offset`
pub async fn list_transactions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    let entries = wallet_service::list_entries(&pool, auth.user_id, &query).await?;

    Ok(Json(entries))
}
