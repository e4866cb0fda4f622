//! Payout orchestration.
//!
//! A payout moves through three steps that cannot share one database
//! transaction:
//!
//! 1. Reserve `amount + fee` and record the payout as `pending` (one transaction)
//! 2. Ask the banking partner to send the transfer (network call)
//! 3. Apply the partner's answer: processing, completed or failed
//!
//! If step 2 fails ambiguously (timeout, 5xx) the payout stays `pending` with
//! the funds still reserved. A later webhook, an admin requery or the
//! background reconciler settles it.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use sqlx::PgConnection;
use tokio::time::interval;
use uuid::Uuid;

use crate::{
    db::{DbPool, is_unique_violation},
    error::AppError,
    models::{
        fee_rule::{FeeOperation, fee_for},
        ledger::{Direction, EntryKind, EntryStatus, NewLedgerEntry},
        page,
        payout::{CreatePayoutRequest, ListPayoutsQuery, Payout, PayoutStatus},
        wallet::Balances,
    },
    partner::{BankingPartner, PartnerError, TransferRequest, TransferState, TransferStatus},
    services::{audit_service, fee_service, onboarding_service, risk_service, wallet_service},
};

/// Payouts untouched for this long are picked up by the reconciler.
const STALE_AFTER_SECS: i64 = 120;

/// Upper bound on payouts requeried per reconciler tick.
const RECONCILE_BATCH: i64 = 50;

async fn find_by_reference(pool: &DbPool, reference: &str) -> Result<Option<Payout>, AppError> {
    let payout = sqlx::query_as::<_, Payout>("SELECT * FROM payouts WHERE reference = $1")
        .bind(reference)
        .fetch_optional(pool)
        .await?;

    Ok(payout)
}

async fn lock_by_reference(conn: &mut PgConnection, reference: &str) -> Result<Payout, AppError> {
    sqlx::query_as::<_, Payout>("SELECT * FROM payouts WHERE reference = $1 FOR UPDATE")
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::PayoutNotFound)
}

/// Result of [`create_payout`].
#[derive(Debug)]
pub struct PayoutCreation {
    pub payout: Payout,
    /// The reference was already used by this user; nothing new was created
    pub replayed: bool,
}

/// An existing payout with the same reference is a replay when it belongs to
/// the same user and a conflict otherwise.
fn replay_or_conflict(existing: Payout, user_id: Uuid) -> Result<PayoutCreation, AppError> {
    if existing.user_id == user_id {
        Ok(PayoutCreation {
            payout: existing,
            replayed: true,
        })
    } else {
        Err(AppError::Conflict(format!(
            "Payout reference {} is already in use",
            existing.reference
        )))
    }
}

/// Create a payout and hand it to the banking partner.
///
/// Idempotent by `reference`: repeating a request returns the payout created
/// the first time, whatever state it has reached since.
pub async fn create_payout(
    pool: &DbPool,
    partner: &dyn BankingPartner,
    user_id: Uuid,
    request: CreatePayoutRequest,
) -> Result<PayoutCreation, AppError> {
    let request = request.validated()?;

    if let Some(existing) = find_by_reference(pool, &request.reference).await? {
        return replay_or_conflict(existing, user_id);
    }

    let user = onboarding_service::get_user(pool, user_id).await?;
    if !user.is_active() {
        return Err(AppError::AccountInactive);
    }

    let fee_rule = fee_service::get_rule(pool, FeeOperation::Payout).await?;
    let fee_cents = fee_for(fee_rule.as_ref(), request.amount_cents);
    let total = request
        .amount_cents
        .checked_add(fee_cents)
        .ok_or_else(|| AppError::InvalidRequest("Amount too large".to_string()))?;

    risk_service::check_payout(pool, &user, request.amount_cents).await?;

    let mut tx = pool.begin().await?;

    let wallet = wallet_service::lock_wallet_for_user(&mut tx, user.id).await?;
    let balances = wallet.balances().lock(total)?;
    wallet_service::store_balances(&mut tx, wallet.id, balances).await?;

    let inserted = sqlx::query_as::<_, Payout>(
        r#"
        INSERT INTO payouts (
            user_id, wallet_id, reference, amount_cents, fee_cents, currency,
            bank_code, account_number, account_name, narration, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(wallet.id)
    .bind(&request.reference)
    .bind(request.amount_cents)
    .bind(fee_cents)
    .bind(&wallet.currency)
    .bind(&request.bank_code)
    .bind(&request.account_number)
    .bind(&request.account_name)
    .bind(&request.narration)
    .bind(PayoutStatus::Pending.as_str())
    .fetch_one(&mut *tx)
    .await;

    let payout = match inserted {
        Ok(payout) => payout,
        Err(e) if is_unique_violation(&e) => {
            // Same reference committed concurrently; our reservation rolls back
            drop(tx);
            let existing = find_by_reference(pool, &request.reference)
                .await?
                .ok_or(AppError::Database(e))?;
            return replay_or_conflict(existing, user_id);
        }
        Err(e) => return Err(e.into()),
    };

    tx.commit().await?;

    tracing::info!(
        payout_id = %payout.id,
        user_id = %user.id,
        amount_cents = payout.amount_cents,
        fee_cents = payout.fee_cents,
        "payout reserved"
    );

    let payout = dispatch(pool, partner, payout).await?;

    Ok(PayoutCreation {
        payout,
        replayed: false,
    })
}

/// What an answer from the partner means for a payout.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PartnerOutcome {
    /// Accepted but not finished yet
    Processing { provider_reference: Option<String> },
    Completed { provider_reference: Option<String> },
    Failed { reason: Option<String> },
    /// The partner has no record of the transfer; only a payout still
    /// `pending` can be failed on that basis
    FailedIfPending { reason: String },
    /// Ambiguous; funds stay reserved and the payout stays `pending`
    Undecided { reason: String },
}

impl From<TransferStatus> for PartnerOutcome {
    fn from(status: TransferStatus) -> Self {
        let provider_reference = status.provider_reference;
        match status.status {
            TransferState::Pending => PartnerOutcome::Processing { provider_reference },
            TransferState::Success => PartnerOutcome::Completed { provider_reference },
            TransferState::Failed | TransferState::Reversed => PartnerOutcome::Failed {
                reason: status.message,
            },
        }
    }
}

/// Map the answer to `initiate_transfer`.
///
/// A rejection is definitive. An unavailable partner may still have accepted
/// the transfer, so nothing is released.
fn dispatch_outcome(result: Result<TransferStatus, PartnerError>) -> PartnerOutcome {
    match result {
        Ok(status) => status.into(),
        Err(PartnerError::Rejected(reason)) => PartnerOutcome::Failed {
            reason: Some(reason),
        },
        Err(PartnerError::Unavailable(reason)) => PartnerOutcome::Undecided { reason },
    }
}

/// Map the answer to `fetch_transfer` for a payout currently in `current`.
fn requery_outcome(
    current: PayoutStatus,
    result: Result<TransferStatus, PartnerError>,
) -> Result<PartnerOutcome, AppError> {
    match result {
        Ok(status) => Ok(status.into()),
        Err(PartnerError::Rejected(reason)) if current == PayoutStatus::Pending => {
            Ok(PartnerOutcome::FailedIfPending { reason })
        }
        Err(e) => Err(e.into()),
    }
}

fn warn_on_reference_mismatch(expected: &str, result: &Result<TransferStatus, PartnerError>) {
    if let Ok(status) = result {
        if status.reference != expected {
            tracing::warn!(
                expected = %expected,
                reported = %status.reference,
                "partner reported a different transfer reference"
            );
        }
    }
}

/// Send a reserved payout to the partner and apply the immediate answer.
async fn dispatch(
    pool: &DbPool,
    partner: &dyn BankingPartner,
    payout: Payout,
) -> Result<Payout, AppError> {
    let transfer = TransferRequest {
        reference: payout.reference.clone(),
        amount_cents: payout.amount_cents,
        currency: payout.currency.clone(),
        bank_code: payout.bank_code.clone(),
        account_number: payout.account_number.clone(),
        account_name: payout.account_name.clone(),
        narration: payout.narration.clone(),
    };

    let result = partner.initiate_transfer(&transfer).await;
    warn_on_reference_mismatch(&payout.reference, &result);

    let outcome = dispatch_outcome(result);
    match &outcome {
        PartnerOutcome::Failed { reason } => {
            tracing::warn!(
                payout_id = %payout.id,
                reason = reason.as_deref().unwrap_or(""),
                "partner rejected payout"
            );
        }
        PartnerOutcome::Undecided { reason } => {
            tracing::error!(
                payout_id = %payout.id,
                %reason,
                "partner unavailable, payout left pending for reconciliation"
            );
        }
        _ => {}
    }

    apply_outcome(pool, &payout, outcome).await
}

async fn apply_outcome(
    pool: &DbPool,
    payout: &Payout,
    outcome: PartnerOutcome,
) -> Result<Payout, AppError> {
    let reference = payout.reference.as_str();
    match outcome {
        PartnerOutcome::Processing { provider_reference } => {
            mark_processing(pool, reference, provider_reference.as_deref()).await
        }
        PartnerOutcome::Completed { provider_reference } => {
            complete_payout(pool, reference, provider_reference.as_deref()).await
        }
        PartnerOutcome::Failed { reason } => {
            unwind_payout(pool, reference, reason.as_deref(), None).await
        }
        PartnerOutcome::FailedIfPending { reason } => {
            unwind_payout(pool, reference, Some(&reason), Some(PayoutStatus::Pending)).await
        }
        PartnerOutcome::Undecided { reason } => {
            record_dispatch_error(pool, payout.id, &reason).await
        }
    }
}

async fn record_dispatch_error(pool: &DbPool, payout_id: Uuid, reason: &str) -> Result<Payout, AppError> {
    let payout = sqlx::query_as::<_, Payout>(
        r#"
        UPDATE payouts
        SET failure_reason = $1, updated_at = NOW()
        WHERE id = $2 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(reason)
    .bind(payout_id)
    .fetch_optional(pool)
    .await?;

    match payout {
        Some(payout) => Ok(payout),
        // A webhook moved it on in the meantime
        None => get_payout(pool, payout_id).await,
    }
}

/// The partner accepted the transfer but has not finished it.
pub async fn mark_processing(
    pool: &DbPool,
    reference: &str,
    provider_reference: Option<&str>,
) -> Result<Payout, AppError> {
    let mut tx = pool.begin().await?;

    let payout = lock_by_reference(&mut tx, reference).await?;
    if payout.status != PayoutStatus::Pending {
        // Already processing, or a faster notification got there first
        return Ok(payout);
    }

    let payout = sqlx::query_as::<_, Payout>(
        r#"
        UPDATE payouts
        SET status = $1,
            provider_reference = COALESCE($2, provider_reference),
            failure_reason = NULL,
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(PayoutStatus::Processing.as_str())
    .bind(provider_reference)
    .bind(payout.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(payout_id = %payout.id, "payout processing");

    Ok(payout)
}

/// Take the reserved funds out of the wallet for a successful transfer.
///
/// Idempotent: completing a completed payout returns it unchanged.
pub async fn complete_payout(
    pool: &DbPool,
    reference: &str,
    provider_reference: Option<&str>,
) -> Result<Payout, AppError> {
    let mut tx = pool.begin().await?;

    let payout = lock_by_reference(&mut tx, reference).await?;
    if payout.status == PayoutStatus::Completed {
        return Ok(payout);
    }
    payout.status.ensure_transition(PayoutStatus::Completed)?;

    let wallet = wallet_service::lock_wallet(&mut tx, payout.wallet_id).await?;
    let before = wallet.balances();
    let after = before.settle_locked(payout.total_cents())?;
    wallet_service::store_balances(&mut tx, wallet.id, after).await?;

    for entry in completion_entries(&payout, before) {
        wallet_service::append_entry(&mut tx, entry).await?;
    }

    let payout = sqlx::query_as::<_, Payout>(
        r#"
        UPDATE payouts
        SET status = $1,
            provider_reference = COALESCE($2, provider_reference),
            failure_reason = NULL,
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(PayoutStatus::Completed.as_str())
    .bind(provider_reference)
    .bind(payout.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(
        payout_id = %payout.id,
        wallet_id = %payout.wallet_id,
        total_cents = payout.total_cents(),
        "payout completed"
    );

    Ok(payout)
}

/// Ledger entries for a completed payout: the amount, then the fee if any.
fn completion_entries(payout: &Payout, before: Balances) -> Vec<NewLedgerEntry> {
    let ledger_reference = format!("payout:{}", payout.reference);
    let after_amount = before.balance - payout.amount_cents;

    let mut entries = vec![NewLedgerEntry {
        wallet_id: payout.wallet_id,
        kind: EntryKind::Payout,
        direction: Direction::Debit,
        amount_cents: payout.amount_cents,
        balance_after_cents: after_amount,
        reference: ledger_reference.clone(),
        status: EntryStatus::Cleared,
        description: payout.narration.clone(),
        metadata: Some(json!({
            "payout_id": payout.id,
            "bank_code": payout.bank_code,
            "account_number": payout.account_number,
        })),
    }];

    if payout.fee_cents > 0 {
        entries.push(NewLedgerEntry {
            wallet_id: payout.wallet_id,
            kind: EntryKind::Fee,
            direction: Direction::Debit,
            amount_cents: payout.fee_cents,
            balance_after_cents: after_amount - payout.fee_cents,
            reference: format!("{}:fee", ledger_reference),
            status: EntryStatus::Cleared,
            description: Some("Payout fee".to_string()),
            metadata: Some(json!({ "payout_id": payout.id })),
        });
    }

    entries
}

/// How unwinding a payout changes the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unwind {
    /// Terminal, or no longer in the expected state
    Unchanged,
    /// `pending`/`processing` → `failed`, reservation released
    Fail(Balances),
    /// `completed` → `reversed`, funds credited back as cleared
    Reverse(Balances),
}

fn plan_unwind(
    status: PayoutStatus,
    only_from: Option<PayoutStatus>,
    balances: Balances,
    total: i64,
) -> Result<Unwind, AppError> {
    if status.is_terminal() || only_from.is_some_and(|expected| expected != status) {
        return Ok(Unwind::Unchanged);
    }

    if status.holds_funds() {
        status.ensure_transition(PayoutStatus::Failed)?;
        Ok(Unwind::Fail(balances.unlock(total)?))
    } else {
        status.ensure_transition(PayoutStatus::Reversed)?;
        Ok(Unwind::Reverse(balances.credit(total, true)?))
    }
}

fn reversal_entry(payout: &Payout, balance_after: i64, reason: Option<&str>) -> NewLedgerEntry {
    NewLedgerEntry {
        wallet_id: payout.wallet_id,
        kind: EntryKind::Reversal,
        direction: Direction::Credit,
        amount_cents: payout.total_cents(),
        balance_after_cents: balance_after,
        reference: format!("payout:{}:reversal", payout.reference),
        status: EntryStatus::Cleared,
        description: reason.map(str::to_string),
        metadata: Some(json!({ "payout_id": payout.id })),
    }
}

/// Undo a payout.
///
/// - `pending`/`processing` → `failed`: the reservation is released
/// - `completed` → `reversed`: `amount + fee` is credited back as cleared funds
/// - `failed`/`reversed`: returned unchanged
pub async fn fail_payout(
    pool: &DbPool,
    reference: &str,
    reason: Option<&str>,
) -> Result<Payout, AppError> {
    unwind_payout(pool, reference, reason, None).await
}

/// [`fail_payout`], restricted to payouts whose locked row is still in `only_from`.
async fn unwind_payout(
    pool: &DbPool,
    reference: &str,
    reason: Option<&str>,
    only_from: Option<PayoutStatus>,
) -> Result<Payout, AppError> {
    let mut tx = pool.begin().await?;

    let payout = lock_by_reference(&mut tx, reference).await?;
    if payout.status.is_terminal() {
        return Ok(payout);
    }

    let wallet = wallet_service::lock_wallet(&mut tx, payout.wallet_id).await?;
    let total = payout.total_cents();

    let next = match plan_unwind(payout.status, only_from, wallet.balances(), total)? {
        Unwind::Unchanged => {
            tracing::debug!(
                payout_id = %payout.id,
                status = %payout.status,
                "payout moved on, not unwound"
            );
            return Ok(payout);
        }
        Unwind::Fail(balances) => {
            wallet_service::store_balances(&mut tx, wallet.id, balances).await?;
            PayoutStatus::Failed
        }
        Unwind::Reverse(balances) => {
            let wallet = wallet_service::store_balances(&mut tx, wallet.id, balances).await?;
            wallet_service::append_entry(
                &mut tx,
                reversal_entry(&payout, wallet.balance_cents, reason),
            )
            .await?;
            PayoutStatus::Reversed
        }
    };

    let payout = sqlx::query_as::<_, Payout>(
        r#"
        UPDATE payouts
        SET status = $1, failure_reason = COALESCE($2, failure_reason), updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(next.as_str())
    .bind(reason)
    .bind(payout.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(
        payout_id = %payout.id,
        status = %payout.status,
        total_cents = total,
        reason = reason.unwrap_or(""),
        "payout unwound"
    );

    Ok(payout)
}

/// Ask the partner for the current state of a payout and apply it.
///
/// A `Rejected` lookup means the partner has no record of the transfer; a
/// payout still `pending` under the row lock is then failed, since the
/// transfer never started.
pub async fn requery(
    pool: &DbPool,
    partner: &dyn BankingPartner,
    actor: Option<Uuid>,
    payout_id: Uuid,
) -> Result<Payout, AppError> {
    let payout = get_payout(pool, payout_id).await?;
    if payout.status.is_terminal() {
        return Ok(payout);
    }

    let result = partner.fetch_transfer(&payout.reference).await;
    warn_on_reference_mismatch(&payout.reference, &result);

    let outcome = requery_outcome(payout.status, result)?;
    let updated = apply_outcome(pool, &payout, outcome).await?;

    if let Some(actor) = actor {
        audit_service::record(
            pool,
            Some(actor),
            "payout.requery",
            "payout",
            updated.id,
            json!({ "from": payout.status, "to": updated.status }),
        )
        .await?;
    }

    Ok(updated)
}

/// Requery payouts stuck in `pending`/`processing`. Returns how many changed state.
pub async fn reconcile_stale(pool: &DbPool, partner: &dyn BankingPartner) -> Result<usize, AppError> {
    let stale = sqlx::query_as::<_, Payout>(
        r#"
        SELECT * FROM payouts
        WHERE status IN ('pending', 'processing')
          AND updated_at < NOW() - INTERVAL '1 second' * $1
        ORDER BY updated_at
        LIMIT $2
        "#,
    )
    .bind(STALE_AFTER_SECS)
    .bind(RECONCILE_BATCH)
    .fetch_all(pool)
    .await?;

    let mut changed = 0;
    for payout in stale {
        match requery(pool, partner, None, payout.id).await {
            Ok(updated) if updated.status != payout.status => changed += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(payout_id = %payout.id, error = %e, "payout requery failed");
            }
        }
    }

    Ok(changed)
}

/// Run [`reconcile_stale`] forever on a fixed interval.
pub async fn run_reconciler(pool: DbPool, partner: Arc<dyn BankingPartner>, every: Duration) {
    let mut ticker = interval(every);
    tracing::info!(interval_secs = every.as_secs(), "payout reconciler started");

    loop {
        ticker.tick().await;

        match reconcile_stale(&pool, partner.as_ref()).await {
            Ok(0) => {}
            Ok(changed) => tracing::info!(count = changed, "reconciled stale payouts"),
            Err(e) => tracing::error!(error = %e, "payout reconciliation failed"),
        }
    }
}

pub async fn get_payout(pool: &DbPool, payout_id: Uuid) -> Result<Payout, AppError> {
    sqlx::query_as::<_, Payout>("SELECT * FROM payouts WHERE id = $1")
        .bind(payout_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::PayoutNotFound)
}

/// A user's own payout; other users' payouts look like they do not exist.
pub async fn get_for_user(pool: &DbPool, user_id: Uuid, payout_id: Uuid) -> Result<Payout, AppError> {
    sqlx::query_as::<_, Payout>("SELECT * FROM payouts WHERE id = $1 AND user_id = $2")
        .bind(payout_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::PayoutNotFound)
}

pub async fn list_for_user(
    pool: &DbPool,
    user_id: Uuid,
    query: &ListPayoutsQuery,
) -> Result<Vec<Payout>, AppError> {
    list(pool, Some(user_id), query).await
}

/// Admin listing; `query.user_id` narrows it to one user.
pub async fn list_all(pool: &DbPool, query: &ListPayoutsQuery) -> Result<Vec<Payout>, AppError> {
    list(pool, query.user_id, query).await
}

async fn list(
    pool: &DbPool,
    user_id: Option<Uuid>,
    query: &ListPayoutsQuery,
) -> Result<Vec<Payout>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let payouts = sqlx::query_as::<_, Payout>(
        r#"
        SELECT * FROM payouts
        WHERE ($1::uuid IS NULL OR user_id = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(query.status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(payouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::partner::{IssuedVirtualAccount, VirtualAccountRequest};

    /// Answers every call with the same canned transfer outcome.
    enum CannedPartner {
        Answers(TransferState),
        Rejects,
        TimesOut,
    }

    impl CannedPartner {
        fn answer(&self, reference: &str) -> Result<TransferStatus, PartnerError> {
            match self {
                CannedPartner::Answers(state) => Ok(TransferStatus {
                    reference: reference.to_string(),
                    provider_reference: Some("TRF_77".to_string()),
                    status: *state,
                    message: Some("partner says so".to_string()),
                }),
                CannedPartner::Rejects => Err(PartnerError::Rejected("unknown account".into())),
                CannedPartner::TimesOut => Err(PartnerError::Unavailable("timed out".into())),
            }
        }
    }

    #[async_trait]
    impl BankingPartner for CannedPartner {
        async fn create_virtual_account(
            &self,
            _request: &VirtualAccountRequest,
        ) -> Result<IssuedVirtualAccount, PartnerError> {
            Err(PartnerError::Unavailable("not used".into()))
        }

        async fn initiate_transfer(
            &self,
            request: &TransferRequest,
        ) -> Result<TransferStatus, PartnerError> {
            self.answer(&request.reference)
        }

        async fn fetch_transfer(&self, reference: &str) -> Result<TransferStatus, PartnerError> {
            self.answer(reference)
        }
    }

    fn transfer(reference: &str) -> TransferRequest {
        TransferRequest {
            reference: reference.to_string(),
            amount_cents: 500_000,
            currency: "NGN".to_string(),
            bank_code: "058".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "Ada Obi".to_string(),
            narration: None,
        }
    }

    fn with_status(status: PayoutStatus) -> Payout {
        Payout {
            status,
            ..payout_owned_by(Uuid::new_v4())
        }
    }

    fn payout_owned_by(user_id: Uuid) -> Payout {
        Payout {
            id: Uuid::new_v4(),
            user_id,
            wallet_id: Uuid::new_v4(),
            reference: "rent-2025-12".to_string(),
            amount_cents: 500_000,
            fee_cents: 5_000,
            currency: "NGN".to_string(),
            bank_code: "058".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "Ada Obi".to_string(),
            narration: None,
            status: PayoutStatus::Processing,
            provider_reference: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn same_user_replay_returns_existing_payout() {
        let user_id = Uuid::new_v4();
        let existing = payout_owned_by(user_id);
        let id = existing.id;

        let creation = replay_or_conflict(existing, user_id).unwrap();
        assert!(creation.replayed);
        assert_eq!(creation.payout.id, id);
        assert_eq!(creation.payout.status, PayoutStatus::Processing);
    }

    #[test]
    fn reference_owned_by_another_user_conflicts() {
        let existing = payout_owned_by(Uuid::new_v4());

        let err = replay_or_conflict(existing, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg.contains("rent-2025-12")));
    }

    #[tokio::test]
    async fn rejected_transfer_fails_the_payout() {
        let partner = CannedPartner::Rejects;
        let outcome = dispatch_outcome(partner.initiate_transfer(&transfer("po-1")).await);

        assert_eq!(
            outcome,
            PartnerOutcome::Failed {
                reason: Some("unknown account".to_string())
            }
        );
    }

    #[tokio::test]
    async fn unreachable_partner_leaves_payout_undecided() {
        let partner = CannedPartner::TimesOut;
        let outcome = dispatch_outcome(partner.initiate_transfer(&transfer("po-1")).await);

        assert_eq!(
            outcome,
            PartnerOutcome::Undecided {
                reason: "timed out".to_string()
            }
        );
    }

    #[tokio::test]
    async fn accepted_and_settled_transfers_map_to_processing_and_completed() {
        let accepted = CannedPartner::Answers(TransferState::Pending);
        let settled = CannedPartner::Answers(TransferState::Success);
        let bounced = CannedPartner::Answers(TransferState::Reversed);

        assert_eq!(
            dispatch_outcome(accepted.initiate_transfer(&transfer("po-1")).await),
            PartnerOutcome::Processing {
                provider_reference: Some("TRF_77".to_string())
            }
        );
        assert_eq!(
            dispatch_outcome(settled.initiate_transfer(&transfer("po-1")).await),
            PartnerOutcome::Completed {
                provider_reference: Some("TRF_77".to_string())
            }
        );
        assert_eq!(
            dispatch_outcome(bounced.initiate_transfer(&transfer("po-1")).await),
            PartnerOutcome::Failed {
                reason: Some("partner says so".to_string())
            }
        );
    }

    #[tokio::test]
    async fn unknown_transfer_fails_only_pending_payouts() {
        let partner = CannedPartner::Rejects;

        let pending = requery_outcome(
            PayoutStatus::Pending,
            partner.fetch_transfer("po-1").await,
        )
        .unwrap();
        assert_eq!(
            pending,
            PartnerOutcome::FailedIfPending {
                reason: "unknown account".to_string()
            }
        );

        let processing = requery_outcome(
            PayoutStatus::Processing,
            partner.fetch_transfer("po-1").await,
        );
        assert!(matches!(
            processing,
            Err(AppError::Partner(PartnerError::Rejected(_)))
        ));
    }

    #[tokio::test]
    async fn requery_surfaces_an_unreachable_partner() {
        let partner = CannedPartner::TimesOut;
        let result = requery_outcome(PayoutStatus::Pending, partner.fetch_transfer("po-1").await);

        assert!(matches!(
            result,
            Err(AppError::Partner(PartnerError::Unavailable(_)))
        ));
    }

    fn reserved(total: i64) -> Balances {
        Balances {
            balance: 1_000_000,
            cleared: 1_000_000,
            locked: total,
        }
    }

    #[test]
    fn failing_an_in_flight_payout_releases_the_reservation() {
        let payout = with_status(PayoutStatus::Processing);
        let total = payout.total_cents();

        let plan = plan_unwind(payout.status, None, reserved(total), total).unwrap();

        assert_eq!(
            plan,
            Unwind::Fail(Balances {
                balance: 1_000_000,
                cleared: 1_000_000,
                locked: 0,
            })
        );
    }

    #[test]
    fn failing_a_completed_payout_reverses_it() {
        let payout = with_status(PayoutStatus::Completed);
        let total = payout.total_cents();
        let after_payout = Balances {
            balance: 1_000_000 - total,
            cleared: 1_000_000 - total,
            locked: 0,
        };

        let plan = plan_unwind(payout.status, None, after_payout, total).unwrap();
        assert_eq!(
            plan,
            Unwind::Reverse(Balances {
                balance: 1_000_000,
                cleared: 1_000_000,
                locked: 0,
            })
        );

        let entry = reversal_entry(&payout, 1_000_000, Some("recalled by bank"));
        assert_eq!(entry.reference, "payout:rent-2025-12:reversal");
        assert_eq!(entry.kind, EntryKind::Reversal);
        assert_eq!(entry.direction, Direction::Credit);
        assert_eq!(entry.status, EntryStatus::Cleared);
        assert_eq!(entry.amount_cents, 505_000);
        assert_eq!(entry.balance_after_cents, 1_000_000);
        assert_eq!(entry.description.as_deref(), Some("recalled by bank"));
    }

    #[test]
    fn terminal_payouts_are_left_alone() {
        for status in [PayoutStatus::Failed, PayoutStatus::Reversed] {
            let plan = plan_unwind(status, None, reserved(0), 505_000).unwrap();
            assert_eq!(plan, Unwind::Unchanged);
        }
    }

    #[test]
    fn pending_only_unwind_skips_a_payout_that_moved_on() {
        let plan = plan_unwind(
            PayoutStatus::Processing,
            Some(PayoutStatus::Pending),
            reserved(505_000),
            505_000,
        )
        .unwrap();
        assert_eq!(plan, Unwind::Unchanged);

        let plan = plan_unwind(
            PayoutStatus::Pending,
            Some(PayoutStatus::Pending),
            reserved(505_000),
            505_000,
        )
        .unwrap();
        assert!(matches!(plan, Unwind::Fail(b) if b.locked == 0));
    }

    #[test]
    fn unwinding_more_than_is_locked_is_refused() {
        let result = plan_unwind(PayoutStatus::Pending, None, reserved(100), 505_000);
        assert!(result.is_err());
    }

    #[test]
    fn completion_writes_amount_then_fee() {
        let payout = with_status(PayoutStatus::Processing);
        let before = reserved(payout.total_cents());

        let entries = completion_entries(&payout, before);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reference, "payout:rent-2025-12");
        assert_eq!(entries[0].amount_cents, 500_000);
        assert_eq!(entries[0].balance_after_cents, 500_000);
        assert_eq!(entries[1].reference, "payout:rent-2025-12:fee");
        assert_eq!(entries[1].kind, EntryKind::Fee);
        assert_eq!(entries[1].balance_after_cents, 495_000);
    }

    #[test]
    fn fee_free_completion_writes_one_entry() {
        let payout = Payout {
            fee_cents: 0,
            ..with_status(PayoutStatus::Pending)
        };

        let entries = completion_entries(&payout, reserved(payout.total_cents()));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].direction, Direction::Debit);
    }
}
