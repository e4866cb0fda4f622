//! Payout HTTP handlers.
//!
//! This module implements the payout API endpoints:
//! - POST /api/v1/payouts/quote - Fee preview
//! - POST /api/v1/payouts - Send money to a bank account
//! - GET /api/v1/payouts - List the caller's payouts
//! - GET /api/v1/payouts/{id} - Get one payout

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::payout::{CreatePayoutRequest, ListPayoutsQuery, Payout, PayoutQuote, PayoutQuoteRequest},
    services::{fee_service, payout_service},
    state::AppState,
};

pub async fn quote(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PayoutQuoteRequest>,
) -> Result<Json<PayoutQuote>, AppError> {
    let quote = fee_service::quote_payout(&pool, auth.user_id, request.amount_cents).await?;

    Ok(Json(quote))
}

/// Create a payout.
///
/// # Request Body
///
/// ```json
/// {
///   "amount_cents": 500000,
///   "bank_code": "058",
///   "account_number": "0123456789",
///   "account_name": "Ada Obi",
///   "narration": "Rent",
///   "reference": "rent-2025-12"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the payout was accepted; its `status` tells how far it got
///   (`processing`, `completed`, or `pending` when the partner could not be
///   reached and the transfer will be reconciled later)
/// - **200 OK**: a payout with this `reference` already exists for the caller
///   and is returned unchanged
/// - **409**: the reference belongs to another user
/// - **422**: insufficient balance, KYC level too low or a risk rule violated
///
/// A payout the partner rejected outright comes back as 201 with status
/// `failed` and `failure_reason` set; its funds are already released.
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreatePayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let creation =
        payout_service::create_payout(&state.pool, state.partner.as_ref(), auth.user_id, request)
            .await?;

    let status = if creation.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(creation.payout)))
}

/// List payouts.
///
/// # Query Parameters
///
/// - `status`: filter by payout status
/// - `limit` (default 50, max 200), `offset`
pub async fn list(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListPayoutsQuery>,
) -> Result<Json<Vec<Payout>>, AppError> {
    let payouts = payout_service::list_for_user(&pool, auth.user_id, &query).await?;

    Ok(Json(payouts))
}

pub async fn get(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payout>, AppError> {
    let payout = payout_service::get_for_user(&pool, auth.user_id, id).await?;

    Ok(Json(payout))
}
