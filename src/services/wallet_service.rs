//! Wallet service - balances and the append-only ledger.
//!
//! This service handles:
//! - Row-locked balance updates
//! - Ledger entry creation
//! - Deposit crediting (idempotent by deposit reference)
//! - Manual admin adjustments
//!
//! # Atomicity Guarantees
//!
//! Every balance change locks the wallet row with `FOR UPDATE`, applies the
//! change through [`Balances`] and appends its ledger entries inside the same
//! PostgreSQL transaction.

use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::{DbPool, is_unique_violation},
    error::AppError,
    models::{
        fee_rule::{FeeOperation, fee_for},
        ledger::{Direction, EntryKind, EntryStatus, LedgerEntry, ListEntriesQuery, NewLedgerEntry},
        page,
        wallet::{AdjustWalletRequest, BalanceError, Balances, Wallet, WalletReconciliation},
        webhook::DepositNotification,
    },
    services::{audit_service, fee_service},
};

/// Result of crediting a deposit notification.
#[derive(Debug)]
pub enum DepositOutcome {
    Credited(LedgerEntry),
    /// The deposit reference was already on the ledger
    Duplicate(LedgerEntry),
}

pub(crate) async fn create_wallet(
    conn: &mut PgConnection,
    user_id: Uuid,
    currency: &str,
) -> Result<Wallet, AppError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "INSERT INTO wallets (user_id, currency) VALUES ($1, $2) RETURNING *",
    )
    .bind(user_id)
    .bind(currency)
    .fetch_one(&mut *conn)
    .await?;

    Ok(wallet)
}

/// Lock a wallet row for the rest of the transaction.
pub(crate) async fn lock_wallet(conn: &mut PgConnection, wallet_id: Uuid) -> Result<Wallet, AppError> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
        .bind(wallet_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::WalletNotFound)
}

pub(crate) async fn lock_wallet_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Wallet, AppError> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::WalletNotFound)
}

/// Write new balances for a wallet locked earlier in the same transaction.
pub(crate) async fn store_balances(
    conn: &mut PgConnection,
    wallet_id: Uuid,
    balances: Balances,
) -> Result<Wallet, AppError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET balance_cents = $1,
            cleared_balance_cents = $2,
            locked_balance_cents = $3,
            updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(balances.balance)
    .bind(balances.cleared)
    .bind(balances.locked)
    .bind(wallet_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(wallet)
}

pub(crate) async fn append_entry(
    conn: &mut PgConnection,
    entry: NewLedgerEntry,
) -> Result<LedgerEntry, sqlx::Error> {
    sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO ledger_entries (
            wallet_id,
            kind,
            direction,
            amount_cents,
            balance_after_cents,
            reference,
            status,
            description,
            metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(entry.wallet_id)
    .bind(entry.kind.as_str())
    .bind(entry.direction.as_str())
    .bind(entry.amount_cents)
    .bind(entry.balance_after_cents)
    .bind(entry.reference)
    .bind(entry.status.as_str())
    .bind(entry.description)
    .bind(entry.metadata)
    .fetch_one(&mut *conn)
    .await
}

pub async fn get_wallet_for_user(pool: &DbPool, user_id: Uuid) -> Result<Wallet, AppError> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::WalletNotFound)
}

/// Ledger entries of a user's wallet, newest first.
pub async fn list_entries(
    pool: &DbPool,
    user_id: Uuid,
    query: &ListEntriesQuery,
) -> Result<Vec<LedgerEntry>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let entries = sqlx::query_as::<_, LedgerEntry>(
        r#"
        SELECT e.* FROM ledger_entries e
        JOIN wallets w ON w.id = e.wallet_id
        WHERE w.user_id = $1
          AND ($2::text IS NULL OR e.kind = $2)
        ORDER BY e.created_at DESC, e.id
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(query.kind.map(|k| k.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

async fn find_entry_by_reference(
    pool: &DbPool,
    reference: &str,
) -> Result<Option<LedgerEntry>, AppError> {
    let entry = sqlx::query_as::<_, LedgerEntry>("SELECT * FROM ledger_entries WHERE reference = $1")
        .bind(reference)
        .fetch_optional(pool)
        .await?;

    Ok(entry)
}

/// How a deposit lands on a wallet.
///
/// The ledger records the gross credit and a separate fee debit; the wallet
/// itself only moves by the net.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DepositSplit {
    pub fee: i64,
    pub net: i64,
    pub status: EntryStatus,
    pub before: Balances,
    pub after: Balances,
    /// Running balance after the gross credit, before the fee comes off
    pub gross_balance_after: i64,
}

/// Apply a deposit of `gross` with a `fee` capped at the deposit itself.
pub(crate) fn split_deposit(
    before: Balances,
    gross: i64,
    fee: i64,
    require_settlement: bool,
) -> Result<DepositSplit, AppError> {
    if gross <= 0 {
        return Err(AppError::InvalidRequest(
            "Deposit amount must be positive".to_string(),
        ));
    }

    let fee = fee.clamp(0, gross);
    let net = gross - fee;
    let after = if net > 0 {
        before.credit(net, !require_settlement)?
    } else {
        before
    };
    let gross_balance_after = after
        .balance
        .checked_add(fee)
        .ok_or(BalanceError::Overflow)?;

    let status = if require_settlement {
        EntryStatus::Uncleared
    } else {
        EntryStatus::Cleared
    };

    Ok(DepositSplit {
        fee,
        net,
        status,
        before,
        after,
        gross_balance_after,
    })
}

pub(crate) fn deposit_reference(processor_reference: &str) -> String {
    format!("deposit:{}", processor_reference)
}

/// Credit a wallet for money received in one of its virtual accounts.
///
/// # Process
///
/// 1. Return the existing entry if this deposit reference is already on the ledger
/// 2. Resolve the virtual account (inactive accounts still receive money)
/// 3. Lock the wallet, credit `amount - fee`, append deposit (and fee) entries
/// 4. Commit
///
/// With `require_settlement`, the credit stays uncleared until a settlement
/// run clears it.
pub async fn credit_deposit(
    pool: &DbPool,
    deposit: &DepositNotification,
    require_settlement: bool,
) -> Result<DepositOutcome, AppError> {
    if deposit.amount_cents <= 0 {
        return Err(AppError::InvalidRequest(
            "Deposit amount must be positive".to_string(),
        ));
    }

    let reference = deposit_reference(&deposit.reference);
    if let Some(existing) = find_entry_by_reference(pool, &reference).await? {
        return Ok(DepositOutcome::Duplicate(existing));
    }

    let fee_rule = fee_service::get_rule(pool, FeeOperation::Deposit).await?;
    let fee = fee_for(fee_rule.as_ref(), deposit.amount_cents);

    let mut tx = pool.begin().await?;

    let wallet_id: Uuid =
        sqlx::query_scalar("SELECT wallet_id FROM virtual_accounts WHERE account_number = $1")
            .bind(&deposit.account_number)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::VirtualAccountNotFound)?;

    let wallet = lock_wallet(&mut tx, wallet_id).await?;

    if let Some(currency) = &deposit.currency {
        if !currency.eq_ignore_ascii_case(&wallet.currency) {
            return Err(AppError::InvalidRequest(format!(
                "Deposit currency {} does not match wallet currency {}",
                currency, wallet.currency
            )));
        }
    }

    let split = split_deposit(wallet.balances(), deposit.amount_cents, fee, require_settlement)?;

    let inserted = append_entry(
        &mut tx,
        NewLedgerEntry {
            wallet_id,
            kind: EntryKind::Deposit,
            direction: Direction::Credit,
            amount_cents: deposit.amount_cents,
            balance_after_cents: split.gross_balance_after,
            reference: reference.clone(),
            status: split.status,
            description: deposit.narration.clone(),
            metadata: Some(json!({
                "account_number": deposit.account_number,
                "sender_name": deposit.sender_name,
                "processor_reference": deposit.reference,
            })),
        },
    )
    .await;

    let entry = match inserted {
        Ok(entry) => entry,
        // A concurrent delivery of the same deposit won the race
        Err(e) if is_unique_violation(&e) => {
            drop(tx);
            let existing = find_entry_by_reference(pool, &reference)
                .await?
                .ok_or(AppError::Database(e))?;
            return Ok(DepositOutcome::Duplicate(existing));
        }
        Err(e) => return Err(e.into()),
    };

    if split.fee > 0 {
        append_entry(
            &mut tx,
            NewLedgerEntry {
                wallet_id,
                kind: EntryKind::Fee,
                direction: Direction::Debit,
                amount_cents: split.fee,
                balance_after_cents: split.after.balance,
                reference: format!("{}:fee", reference),
                status: split.status,
                description: Some("Deposit fee".to_string()),
                metadata: None,
            },
        )
        .await?;
    }

    if split.after != split.before {
        store_balances(&mut tx, wallet_id, split.after).await?;
    }

    tx.commit().await?;

    tracing::info!(
        wallet_id = %wallet_id,
        reference = %deposit.reference,
        amount_cents = deposit.amount_cents,
        fee_cents = split.fee,
        net_cents = split.net,
        cleared = !require_settlement,
        "deposit credited"
    );

    Ok(DepositOutcome::Credited(entry))
}

/// Manually credit or debit a wallet.
///
/// Credits land as cleared funds; debits need enough available balance.
pub async fn adjust(
    pool: &DbPool,
    actor: Uuid,
    user_id: Uuid,
    request: AdjustWalletRequest,
) -> Result<(Wallet, LedgerEntry), AppError> {
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(AppError::InvalidRequest(
            "An adjustment needs a reason".to_string(),
        ));
    }
    if request.amount_cents == 0 {
        return Err(AppError::InvalidRequest(
            "Adjustment amount cannot be zero".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let wallet = lock_wallet_for_user(&mut tx, user_id).await?;
    let (balances, direction, amount) = if request.amount_cents > 0 {
        (
            wallet.balances().credit(request.amount_cents, true)?,
            Direction::Credit,
            request.amount_cents,
        )
    } else {
        let amount = request
            .amount_cents
            .checked_neg()
            .ok_or_else(|| AppError::InvalidRequest("Adjustment amount out of range".to_string()))?;
        (wallet.balances().debit(amount)?, Direction::Debit, amount)
    };

    let wallet = store_balances(&mut tx, wallet.id, balances).await?;
    let entry = append_entry(
        &mut tx,
        NewLedgerEntry {
            wallet_id: wallet.id,
            kind: EntryKind::Adjustment,
            direction,
            amount_cents: amount,
            balance_after_cents: wallet.balance_cents,
            reference: format!("adjustment:{}", Uuid::new_v4()),
            status: EntryStatus::Cleared,
            description: Some(reason.to_string()),
            metadata: Some(json!({ "actor_user_id": actor })),
        },
    )
    .await?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "wallet.adjust",
        "wallet",
        wallet.id,
        json!({
            "amount_cents": request.amount_cents,
            "reason": reason,
            "ledger_entry_id": entry.id,
        }),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(
        wallet_id = %wallet.id,
        amount_cents = request.amount_cents,
        "wallet adjusted"
    );

    Ok((wallet, entry))
}

/// Recompute a wallet's balances from the ledger and payouts and compare.
pub async fn reconcile(pool: &DbPool, user_id: Uuid) -> Result<WalletReconciliation, AppError> {
    let wallet = get_wallet_for_user(pool, user_id).await?;

    let report = sqlx::query_as::<_, WalletReconciliation>(
        r#"
        SELECT
            w.id AS wallet_id,
            w.balance_cents,
            COALESCE((
                SELECT SUM(CASE WHEN e.direction = 'credit' THEN e.amount_cents ELSE -e.amount_cents END)
                FROM ledger_entries e WHERE e.wallet_id = w.id
            ), 0)::BIGINT AS ledger_balance_cents,
            COALESCE((
                SELECT SUM(CASE WHEN e.direction = 'credit' THEN e.amount_cents ELSE -e.amount_cents END)
                FROM ledger_entries e WHERE e.wallet_id = w.id AND e.status = 'uncleared'
            ), 0)::BIGINT AS uncleared_ledger_cents,
            COALESCE((
                SELECT SUM(p.amount_cents + p.fee_cents)
                FROM payouts p WHERE p.wallet_id = w.id AND p.status IN ('pending', 'processing')
            ), 0)::BIGINT AS in_flight_payout_cents
        FROM wallets w
        WHERE w.id = $1
        "#,
    )
    .bind(wallet.id)
    .fetch_one(pool)
    .await?;

    let report = report.check(&wallet);
    if !report.consistent {
        tracing::error!(wallet_id = %wallet.id, ?report, "wallet does not reconcile with ledger");
    }

    Ok(report)
}
