//! Settlement runs.
//!
//! Deposits credited while `DEPOSITS_REQUIRE_SETTLEMENT` is on stay
//! uncleared. A run clears every uncleared entry created up to the cutoff and
//! moves the net amount per wallet into the cleared balance.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        PageQuery,
        ledger::Direction,
        page,
        settlement::{RunSettlementRequest, Settlement},
        wallet::{Balances, Wallet},
    },
    services::{audit_service, wallet_service},
};

/// Sum uncleared entries per wallet, credits minus debits.
///
/// The map is ordered by wallet id, which is also the order wallets are
/// locked in.
pub(crate) fn net_by_wallet(entries: &[(Uuid, Direction, i64)]) -> BTreeMap<Uuid, i64> {
    let mut net = BTreeMap::new();
    for &(wallet_id, direction, amount) in entries {
        let signed = match direction {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        };
        *net.entry(wallet_id).or_insert(0) += signed;
    }
    net
}

/// New balances for every wallet with a positive net, in lock order.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ClearingPlan {
    pub updates: Vec<(Uuid, Balances)>,
    pub total_cents: i64,
}

/// Move each wallet's positive net from uncleared to cleared funds.
///
/// A wallet whose uncleared entries net to zero or less has nothing to make
/// spendable and is left as it is.
pub(crate) fn plan_clearing(
    wallets: &BTreeMap<Uuid, Balances>,
    entries: &[(Uuid, Direction, i64)],
) -> Result<ClearingPlan, AppError> {
    let mut plan = ClearingPlan {
        updates: Vec::new(),
        total_cents: 0,
    };

    for (wallet_id, net) in net_by_wallet(entries) {
        if net <= 0 {
            continue;
        }
        let balances = wallets.get(&wallet_id).ok_or(AppError::WalletNotFound)?;
        plan.updates.push((wallet_id, balances.clear(net)?));
        plan.total_cents += net;
    }

    Ok(plan)
}

pub async fn run(
    pool: &DbPool,
    actor: Uuid,
    request: RunSettlementRequest,
) -> Result<Settlement, AppError> {
    let cutoff: DateTime<Utc> = request.cutoff.unwrap_or_else(Utc::now);

    let mut tx = pool.begin().await?;

    let settlement = sqlx::query_as::<_, Settlement>(
        r#"
        INSERT INTO settlements (cutoff, entry_count, total_cents, created_by)
        VALUES ($1, 0, 0, $2)
        RETURNING *
        "#,
    )
    .bind(cutoff)
    .bind(actor)
    .fetch_one(&mut *tx)
    .await?;

    let wallet_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT wallet_id FROM ledger_entries
        WHERE status = 'uncleared' AND created_at <= $1
        ORDER BY wallet_id
        "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    let wallets: BTreeMap<Uuid, Wallet> = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&wallet_ids)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|w| (w.id, w))
    .collect();

    let cleared: Vec<(Uuid, String, i64)> = sqlx::query_as(
        r#"
        UPDATE ledger_entries
        SET status = 'cleared', settlement_id = $1
        WHERE status = 'uncleared' AND created_at <= $2 AND wallet_id = ANY($3)
        RETURNING wallet_id, direction, amount_cents
        "#,
    )
    .bind(settlement.id)
    .bind(cutoff)
    .bind(&wallet_ids)
    .fetch_all(&mut *tx)
    .await?;

    let entries = cleared
        .into_iter()
        .map(|(wallet_id, direction, amount)| {
            let direction = direction
                .parse::<Direction>()
                .map_err(|e| AppError::Conflict(e.to_string()))?;
            Ok((wallet_id, direction, amount))
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let current: BTreeMap<Uuid, Balances> =
        wallets.iter().map(|(&id, w)| (id, w.balances())).collect();
    let plan = plan_clearing(&current, &entries)?;
    for &(wallet_id, balances) in &plan.updates {
        wallet_service::store_balances(&mut tx, wallet_id, balances).await?;
    }
    let total_cents = plan.total_cents;

    let settlement = sqlx::query_as::<_, Settlement>(
        "UPDATE settlements SET entry_count = $1, total_cents = $2 WHERE id = $3 RETURNING *",
    )
    .bind(entries.len() as i64)
    .bind(total_cents)
    .bind(settlement.id)
    .fetch_one(&mut *tx)
    .await?;

    audit_service::record(
        &mut *tx,
        Some(actor),
        "settlement.run",
        "settlement",
        settlement.id,
        json!({
            "cutoff": settlement.cutoff,
            "entry_count": settlement.entry_count,
            "total_cents": settlement.total_cents,
            "wallets": wallets.len(),
        }),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(
        settlement_id = %settlement.id,
        entry_count = settlement.entry_count,
        total_cents = settlement.total_cents,
        "settlement run complete"
    );

    Ok(settlement)
}

pub async fn list(pool: &DbPool, query: &PageQuery) -> Result<Vec<Settlement>, AppError> {
    let (limit, offset) = page(query.limit, query.offset);

    let settlements = sqlx::query_as::<_, Settlement>(
        "SELECT * FROM settlements ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(settlements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nets_deposits_against_their_fees() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let entries = [
            (b, Direction::Credit, 10_000),
            (a, Direction::Credit, 50_000),
            (a, Direction::Debit, 500),
            (b, Direction::Debit, 100),
            (a, Direction::Credit, 2_000),
        ];

        let net = net_by_wallet(&entries);

        assert_eq!(net.get(&a), Some(&51_500));
        assert_eq!(net.get(&b), Some(&9_900));
    }

    #[test]
    fn wallets_come_out_in_id_order() {
        let ids: Vec<Uuid> = (1..=5u128).rev().map(Uuid::from_u128).collect();
        let entries: Vec<_> = ids.iter().map(|&id| (id, Direction::Credit, 1)).collect();

        let ordered: Vec<Uuid> = net_by_wallet(&entries).into_keys().collect();

        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(ordered, expected);
    }

    #[test]
    fn empty_run_has_no_wallets() {
        assert!(net_by_wallet(&[]).is_empty());
    }

    fn unsettled(balance: i64, cleared: i64) -> Balances {
        Balances {
            balance,
            cleared,
            locked: 0,
        }
    }

    #[test]
    fn clearing_makes_the_net_spendable() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let wallets = BTreeMap::from([(a, unsettled(61_500, 10_000)), (b, unsettled(9_900, 0))]);
        let entries = [
            (a, Direction::Credit, 50_000),
            (a, Direction::Debit, 500),
            (a, Direction::Credit, 2_000),
            (b, Direction::Credit, 10_000),
            (b, Direction::Debit, 100),
        ];

        let plan = plan_clearing(&wallets, &entries).unwrap();

        assert_eq!(plan.total_cents, 61_400);
        assert_eq!(
            plan.updates,
            vec![(a, unsettled(61_500, 61_500)), (b, unsettled(9_900, 9_900))]
        );
    }

    #[test]
    fn wallets_netting_to_nothing_are_untouched() {
        let a = Uuid::from_u128(1);
        let wallets = BTreeMap::from([(a, unsettled(0, 0))]);
        let entries = [(a, Direction::Credit, 300), (a, Direction::Debit, 300)];

        let plan = plan_clearing(&wallets, &entries).unwrap();

        assert!(plan.updates.is_empty());
        assert_eq!(plan.total_cents, 0);
    }

    #[test]
    fn clearing_more_than_is_uncleared_is_refused() {
        let a = Uuid::from_u128(1);
        let wallets = BTreeMap::from([(a, unsettled(5_000, 5_000))]);

        let result = plan_clearing(&wallets, &[(a, Direction::Credit, 1_000)]);

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn entry_for_an_unlocked_wallet_is_an_error() {
        let result = plan_clearing(&BTreeMap::new(), &[(Uuid::from_u128(9), Direction::Credit, 1)]);
        assert!(matches!(result, Err(AppError::WalletNotFound)));
    }
}
