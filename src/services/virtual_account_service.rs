//! Virtual account issuance through the banking partner.

use serde_json::json;
use uuid::Uuid;

use crate::{
    db::{DbPool, is_unique_violation},
    error::AppError,
    models::{
        page,
        virtual_account::{ListVirtualAccountsQuery, VirtualAccount},
    },
    partner::{BankingPartner, VirtualAccountRequest},
    services::{audit_service, onboarding_service, wallet_service},
};

async fn find_active(pool: &DbPool, user_id: Uuid) -> Result<Option<VirtualAccount>, AppError> {
    let account = sqlx::query_as::<_, VirtualAccount>(
        "SELECT * FROM virtual_accounts WHERE user_id = $1 AND is_active",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(account)
}

/// Result of [`issue`].
#[derive(Debug)]
pub struct VirtualAccountIssue {
    pub account: VirtualAccount,
    /// False when the user already had an active account
    pub created: bool,
}

impl VirtualAccountIssue {
    fn existing(account: VirtualAccount) -> Self {
        Self {
            account,
            created: false,
        }
    }
}

/// Issue a virtual account for the user, or return the one they already have.
///
/// # Process
///
/// 1. Check the user is active and has the minimum KYC level
/// 2. Return the existing active account, if any
/// 3. Ask the partner for a new account number and store it
///
/// The partner call happens outside any database transaction. If two requests
/// race, the loser's insert hits the one-active-account index and the
/// winner's account is returned.
pub async fn issue(
    pool: &DbPool,
    partner: &dyn BankingPartner,
    min_kyc_level: i16,
    user_id: Uuid,
) -> Result<VirtualAccountIssue, AppError> {
    let user = onboarding_service::get_user(pool, user_id).await?;
    if !user.is_active() {
        return Err(AppError::AccountInactive);
    }
    user.require_kyc_level(min_kyc_level)?;

    if let Some(existing) = find_active(pool, user.id).await? {
        return Ok(VirtualAccountIssue::existing(existing));
    }

    let wallet = wallet_service::get_wallet_for_user(pool, user.id).await?;

    let issued = partner
        .create_virtual_account(&VirtualAccountRequest {
            customer_reference: user.id,
            account_name: user.full_name.clone(),
            email: user.email.clone(),
        })
        .await
        .inspect_err(|e| {
            tracing::warn!(user_id = %user.id, error = %e, "virtual account issuance failed");
        })?;

    let inserted = sqlx::query_as::<_, VirtualAccount>(
        r#"
        INSERT INTO virtual_accounts (
            user_id, wallet_id, account_number, account_name, bank_name, provider_reference
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(wallet.id)
    .bind(&issued.account_number)
    .bind(&issued.account_name)
    .bind(&issued.bank_name)
    .bind(&issued.reference)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(account) => {
            tracing::info!(
                user_id = %user.id,
                virtual_account_id = %account.id,
                bank_name = %account.bank_name,
                "virtual account issued"
            );
            Ok(VirtualAccountIssue {
                account,
                created: true,
            })
        }
        Err(e) if is_unique_violation(&e) => find_active(pool, user.id)
            .await?
            .map(VirtualAccountIssue::existing)
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Account number {} is already assigned",
                    issued.account_number
                ))
            }),
        Err(e) => Err(e.into()),
    }
}

pub async fn list_for_user(pool: &DbPool, user_id: Uuid) -> Result<Vec<VirtualAccount>, AppError> {
    let accounts = sqlx::query_as::<_, VirtualAccount>(
        "SELECT * FROM virtual_accounts WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(accounts)
}

pub async fn list_all(
    pool: &DbPool,
    query: &ListVirtualAccountsQuery,
) -> Result<Vec<VirtualAccount>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let accounts = sqlx::query_as::<_, VirtualAccount>(
        r#"
        SELECT * FROM virtual_accounts
        WHERE ($1::uuid IS NULL OR user_id = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(query.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(accounts)
}

/// Stop handing out an account number. Deposits that still arrive on it are
/// credited as usual.
pub async fn deactivate(pool: &DbPool, actor: Uuid, account_id: Uuid) -> Result<VirtualAccount, AppError> {
    let mut tx = pool.begin().await?;

    let account = sqlx::query_as::<_, VirtualAccount>(
        "UPDATE virtual_accounts SET is_active = false WHERE id = $1 RETURNING *",
    )
    .bind(account_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::VirtualAccountNotFound)?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "virtual_account.deactivate",
        "virtual_account",
        account.id,
        json!({ "user_id": account.user_id, "account_number": account.account_number }),
    )
    .await?;

    tx.commit().await?;

    Ok(account)
}
