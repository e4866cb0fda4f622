//! Admin console API.
//!
//! Every handler here sits behind both the API key middleware and
//! `require_admin`, so `auth.user_id` is always an admin and is recorded as
//! the actor of any mutation.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        PageQuery,
        audit_log::{AuditLog, ListAuditLogsQuery},
        fee_rule::{FeeOperation, FeeRule, UpsertFeeRuleRequest},
        kyc::{KycSubmission, ListKycQuery, ReviewKycRequest},
        ledger::{LedgerEntry, ListEntriesQuery},
        payout::{ListPayoutsQuery, Payout},
        risk_rule::{CreateRiskRuleRequest, RiskRule, UpdateRiskRuleRequest},
        settlement::{RunSettlementRequest, Settlement},
        tenant::{CreateTenantRequest, Tenant, UpdateTenantStatusRequest},
        user::{ListUsersQuery, UpdateUserStatusRequest, User},
        virtual_account::{ListVirtualAccountsQuery, VirtualAccount},
        wallet::{AdjustWalletRequest, WalletReconciliation, WalletResponse},
        webhook::{ListWebhookEventsQuery, WebhookEvent},
    },
    services::{
        audit_service, fee_service, kyc_service, onboarding_service, payout_service, risk_service,
        settlement_service, virtual_account_service, wallet_service, webhook_service,
    },
    state::AppState,
};

// Tenants

pub async fn create_tenant(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = onboarding_service::create_tenant(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn list_tenants(State(pool): State<DbPool>) -> Result<Json<Vec<Tenant>>, AppError> {
    Ok(Json(onboarding_service::list_tenants(&pool).await?))
}

/// `PATCH /admin/tenants/{id}/status` with `{ "status": "suspended" }`.
///
/// Suspending a tenant locks out every user in it at the auth middleware.
pub async fn set_tenant_status(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTenantStatusRequest>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = onboarding_service::set_tenant_status(&pool, auth.user_id, id, request.status).await?;

    Ok(Json(tenant))
}

// Users

pub async fn list_users(
    State(pool): State<DbPool>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(onboarding_service::list_users(&pool, &query).await?))
}

pub async fn get_user(
    State(pool): State<DbPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    Ok(Json(onboarding_service::get_user(&pool, id).await?))
}

pub async fn set_user_status(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserStatusRequest>,
) -> Result<Json<User>, AppError> {
    let user = onboarding_service::set_user_status(&pool, auth.user_id, id, request.status).await?;

    Ok(Json(user))
}

#[derive(Debug, Serialize)]
pub struct RotatedApiKey {
    pub user_id: Uuid,
    pub api_key: String,
}

/// Revoke all of a user's API keys and issue a new one.
///
/// The new key is only visible in this response.
pub async fn rotate_api_key(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let api_key = onboarding_service::rotate_api_key(&pool, auth.user_id, id).await?;

    Ok((
        StatusCode::CREATED,
        Json(RotatedApiKey {
            user_id: id,
            api_key,
        }),
    ))
}

// KYC review

pub async fn list_kyc(
    State(pool): State<DbPool>,
    Query(query): Query<ListKycQuery>,
) -> Result<Json<Vec<KycSubmission>>, AppError> {
    Ok(Json(kyc_service::list(&pool, &query).await?))
}

/// Approve a pending submission and raise the user's KYC level.
///
/// Body is optional: `{ "note": "..." }`.
pub async fn approve_kyc(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    request: Option<Json<ReviewKycRequest>>,
) -> Result<Json<KycSubmission>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    Ok(Json(kyc_service::approve(&pool, auth.user_id, id, request).await?))
}

pub async fn reject_kyc(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    request: Option<Json<ReviewKycRequest>>,
) -> Result<Json<KycSubmission>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    Ok(Json(kyc_service::reject(&pool, auth.user_id, id, request).await?))
}

// Wallets

pub async fn get_wallet(
    State(pool): State<DbPool>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = wallet_service::get_wallet_for_user(&pool, user_id).await?;

    Ok(Json(wallet.into()))
}

pub async fn list_wallet_transactions(
    State(pool): State<DbPool>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(wallet_service::list_entries(&pool, user_id, &query).await?))
}

#[derive(Debug, Serialize)]
pub struct AdjustmentResponse {
    pub wallet: WalletResponse,
    pub entry: LedgerEntry,
}

/// Manually credit (positive `amount_cents`) or debit (negative) a wallet.
///
/// # Request Body
///
/// ```json
/// { "amount_cents": -2500, "reason": "Chargeback for DEP-88213" }
/// ```
///
/// Debits need enough available balance (422 otherwise).
pub async fn adjust_wallet(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AdjustWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (wallet, entry) = wallet_service::adjust(&pool, auth.user_id, user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(AdjustmentResponse {
            wallet: wallet.into(),
            entry,
        }),
    ))
}

/// Compare stored balances with the ledger and in-flight payouts.
pub async fn reconcile_wallet(
    State(pool): State<DbPool>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<WalletReconciliation>, AppError> {
    Ok(Json(wallet_service::reconcile(&pool, user_id).await?))
}

// Virtual accounts

pub async fn list_virtual_accounts(
    State(pool): State<DbPool>,
    Query(query): Query<ListVirtualAccountsQuery>,
) -> Result<Json<Vec<VirtualAccount>>, AppError> {
    Ok(Json(virtual_account_service::list_all(&pool, &query).await?))
}

pub async fn deactivate_virtual_account(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<VirtualAccount>, AppError> {
    Ok(Json(
        virtual_account_service::deactivate(&pool, auth.user_id, id).await?,
    ))
}

// Payouts

pub async fn list_payouts(
    State(pool): State<DbPool>,
    Query(query): Query<ListPayoutsQuery>,
) -> Result<Json<Vec<Payout>>, AppError> {
    Ok(Json(payout_service::list_all(&pool, &query).await?))
}

pub async fn get_payout(
    State(pool): State<DbPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payout>, AppError> {
    Ok(Json(payout_service::get_payout(&pool, id).await?))
}

/// Ask the banking partner for a payout's status and apply it.
///
/// Used to settle payouts left `pending` after a partner outage.
pub async fn requery_payout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payout>, AppError> {
    let payout =
        payout_service::requery(&state.pool, state.partner.as_ref(), Some(auth.user_id), id)
            .await?;

    Ok(Json(payout))
}

// Fee rules

pub async fn list_fee_rules(State(pool): State<DbPool>) -> Result<Json<Vec<FeeRule>>, AppError> {
    Ok(Json(fee_service::list_rules(&pool).await?))
}

/// `PUT /admin/fee-rules/{operation}` where operation is `payout` or `deposit`.
///
/// # Request Body
///
/// ```json
/// {
///   "fee_type": "mixed",
///   "flat_cents": 1000,
///   "percent_bp": 50,
///   "min_fee_cents": 0,
///   "max_fee_cents": 200000,
///   "is_active": true
/// }
/// ```
pub async fn upsert_fee_rule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(operation): Path<FeeOperation>,
    Json(request): Json<UpsertFeeRuleRequest>,
) -> Result<Json<FeeRule>, AppError> {
    let rule = fee_service::upsert_rule(&pool, auth.user_id, operation, request).await?;

    Ok(Json(rule))
}

// Risk rules

pub async fn list_risk_rules(State(pool): State<DbPool>) -> Result<Json<Vec<RiskRule>>, AppError> {
    Ok(Json(risk_service::list(&pool).await?))
}

pub async fn create_risk_rule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateRiskRuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let rule = risk_service::create(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_risk_rule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRiskRuleRequest>,
) -> Result<Json<RiskRule>, AppError> {
    Ok(Json(risk_service::update(&pool, auth.user_id, id, request).await?))
}

pub async fn delete_risk_rule(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    risk_service::delete(&pool, auth.user_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// Settlements

/// Clear every uncleared ledger entry up to `cutoff` (default now).
///
/// Body is optional: `{ "cutoff": "2025-12-20T00:00:00Z" }`.
pub async fn run_settlement(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    request: Option<Json<RunSettlementRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let settlement = settlement_service::run(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(settlement)))
}

pub async fn list_settlements(
    State(pool): State<DbPool>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Settlement>>, AppError> {
    Ok(Json(settlement_service::list(&pool, &query).await?))
}

// Webhook events

pub async fn list_webhook_events(
    State(pool): State<DbPool>,
    Query(query): Query<ListWebhookEventsQuery>,
) -> Result<Json<Vec<WebhookEvent>>, AppError> {
    Ok(Json(webhook_service::list_events(&pool, &query).await?))
}

/// Re-run a stored event that failed or was interrupted.
pub async fn replay_webhook_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookEvent>, AppError> {
    let event = webhook_service::replay(
        &state.pool,
        state.config.deposits_require_settlement,
        auth.user_id,
        id,
    )
    .await?;

    Ok(Json(event))
}

// Audit logs

/// # Query Parameters
///
/// - `entity_type`, `entity_id`, `actor_user_id`: exact-match filters
/// - `limit` (default 50, max 200), `offset`
pub async fn list_audit_logs(
    State(pool): State<DbPool>,
    Query(query): Query<ListAuditLogsQuery>,
) -> Result<Json<Vec<AuditLog>>, AppError> {
    Ok(Json(audit_service::list(&pool, &query).await?))
}
