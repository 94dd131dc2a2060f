//! Sale service - closing a sale against stock and the ledger at once.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        ledger_entry::{EntryKind, EntrySource, LedgerEntry, NewLedgerEntry},
        sale::{CloseSaleRequest, SaleCloseResponse},
    },
    services::{ledger_service, stock_service},
};

/// Sum quantities per item, in item id order.
///
/// Items are consumed (and locked) in this order so that two sales sharing
/// items always take their locks in the same sequence.
pub fn consolidate_lines(request: &CloseSaleRequest) -> Result<BTreeMap<Uuid, i64>, AppError> {
    let mut per_item = BTreeMap::new();
    for line in &request.lines {
        if line.qty <= 0 {
            return Err(AppError::InvalidQuantity);
        }
        *per_item.entry(line.item_id).or_insert(0) += line.qty;
    }
    Ok(per_item)
}

fn already_recognized(sale_id: Uuid, entry: LedgerEntry) -> SaleCloseResponse {
    SaleCloseResponse {
        sale_id,
        entry: entry.into(),
        already_recognized: true,
        consumptions: Vec::new(),
        cost_of_goods: 0,
    }
}

/// Close a sale: consume its lines FIFO and recognize its cash once.
///
/// # Process
///
/// 1. If the sale's cash was already recognized, return that entry and
///    consume nothing
/// 2. Start database transaction
/// 3. Consume each item FIFO (locks taken in item id order)
/// 4. Append the `IN` entry with `source = SALE`, `source_ref = sale_id`
/// 5. Commit; any failure rolls back every lot decrement
///
/// # Errors
///
/// - `InvalidAmount`: total is zero or negative
/// - `InsufficientStock`: a line cannot be covered; nothing is consumed
/// - `AccountNotFound` / `ItemNotFound`
pub async fn close_sale(
    pool: &DbPool,
    company_id: Uuid,
    request: CloseSaleRequest,
) -> Result<SaleCloseResponse, AppError> {
    if request.total_amount <= 0 {
        return Err(AppError::InvalidAmount);
    }
    let per_item = consolidate_lines(&request)?;
    let sale_ref = request.sale_id.to_string();

    let mut tx = pool.begin().await?;

    if let Some(existing) = ledger_service::find_sale_entry(&mut tx, company_id, &sale_ref).await? {
        tracing::info!(sale_id = %request.sale_id, "sale already closed");
        return Ok(already_recognized(request.sale_id, existing));
    }

    let mut consumptions = Vec::with_capacity(per_item.len());
    for (item_id, qty) in per_item {
        let consumption = stock_service::consume_fifo_in_tx(
            &mut tx,
            company_id,
            item_id,
            qty,
            Some(request.sale_id),
        )
        .await?;
        consumptions.push(consumption);
    }
    let cost_of_goods = consumptions
        .iter()
        .try_fold(0i64, |total, c| total.checked_add(c.cost))
        .ok_or(AppError::InvalidAmount)?;

    let new_entry = NewLedgerEntry {
        company_id,
        account_id: request.account_id,
        kind: EntryKind::In,
        amount: request.total_amount,
        source: EntrySource::Sale,
        source_ref: Some(sale_ref.clone()),
        date: request.date,
        meta: Some(serde_json::json!({
            "lines": request.lines.len(),
            "cost_of_goods": cost_of_goods,
        })),
    };

    let outcome = match ledger_service::append_entry_in_tx(&mut tx, &new_entry).await {
        Ok(outcome) => outcome,
        Err(AppError::Database(sqlx::Error::Database(db_err))) if db_err.is_unique_violation() => {
            // Another close of this sale committed first; drop our consumption.
            tx.rollback().await?;
            let mut conn = pool.acquire().await?;
            let existing = ledger_service::find_sale_entry(&mut conn, company_id, &sale_ref)
                .await?
                .ok_or(AppError::Database(sqlx::Error::Database(db_err)))?;
            return Ok(already_recognized(request.sale_id, existing));
        }
        Err(err) => return Err(err),
    };

    if outcome.duplicate {
        tx.rollback().await?;
        return Ok(already_recognized(request.sale_id, outcome.entry));
    }

    tx.commit().await?;

    tracing::info!(
        company_id = %company_id,
        sale_id = %request.sale_id,
        entry_id = %outcome.entry.id,
        amount = request.total_amount,
        cost_of_goods,
        "sale closed"
    );

    Ok(SaleCloseResponse {
        sale_id: request.sale_id,
        entry: outcome.entry.into(),
        already_recognized: false,
        consumptions,
        cost_of_goods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sale::SaleLine;

    fn request(lines: Vec<(Uuid, i64)>) -> CloseSaleRequest {
        CloseSaleRequest {
            sale_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            total_amount: 100,
            date: None,
            lines: lines
                .into_iter()
                .map(|(item_id, qty)| SaleLine { item_id, qty })
                .collect(),
        }
    }

    #[test]
    fn lines_for_the_same_item_are_merged_in_id_order() {
        let a = Uuid::from_u128(2);
        let b = Uuid::from_u128(1);
        let merged = consolidate_lines(&request(vec![(a, 1), (b, 2), (a, 3)])).unwrap();
        assert_eq!(merged.into_iter().collect::<Vec<_>>(), vec![(b, 2), (a, 4)]);
    }

    #[test]
    fn non_positive_line_is_rejected() {
        let err = consolidate_lines(&request(vec![(Uuid::new_v4(), 0)])).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity));
    }
}

#[cfg(test)]
mod scenarios {
    use super::*;
    use crate::{
        models::sale::SaleLine,
        test_support::{cached_stock, day, lot_qtys, seed_account, seed_company, seed_item, seed_lot},
    };

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn closing_twice_consumes_once(pool: DbPool) {
        let company = seed_company(&pool).await;
        let account = seed_account(&pool, company, 0).await;
        let item = seed_item(&pool, company, "CHAIN-116").await;
        seed_lot(&pool, company, item.id, 3, 1_000, day(1)).await;
        seed_lot(&pool, company, item.id, 4, 1_200, day(2)).await;

        let request = CloseSaleRequest {
            sale_id: Uuid::new_v4(),
            account_id: account.id,
            total_amount: 10_000,
            date: None,
            lines: vec![
                SaleLine { item_id: item.id, qty: 2 },
                SaleLine { item_id: item.id, qty: 2 },
            ],
        };

        let first = close_sale(&pool, company, request.clone()).await.unwrap();
        assert!(!first.already_recognized);
        assert_eq!(first.consumptions.len(), 1);
        assert_eq!(first.cost_of_goods, 3 * 1_000 + 1_200);
        assert_eq!(first.entry.balance_after, 10_000);

        let second = close_sale(&pool, company, request).await.unwrap();
        assert!(second.already_recognized);
        assert_eq!(second.entry.id, first.entry.id);
        assert!(second.consumptions.is_empty());

        assert_eq!(lot_qtys(&pool, company, item.id).await, vec![0, 3]);
        assert_eq!(cached_stock(&pool, item.id).await, 3);
        assert_eq!(
            ledger_service::current_balance(&pool, company, account.id).await.unwrap(),
            10_000
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn short_line_blocks_the_whole_sale(pool: DbPool) {
        let company = seed_company(&pool).await;
        let account = seed_account(&pool, company, 0).await;
        let stocked = seed_item(&pool, company, "TUBE-26").await;
        let scarce = seed_item(&pool, company, "TIRE-26").await;
        seed_lot(&pool, company, stocked.id, 5, 300, day(1)).await;
        seed_lot(&pool, company, scarce.id, 1, 900, day(1)).await;

        let err = close_sale(
            &pool,
            company,
            CloseSaleRequest {
                sale_id: Uuid::new_v4(),
                account_id: account.id,
                total_amount: 5_000,
                date: None,
                lines: vec![
                    SaleLine { item_id: stocked.id, qty: 2 },
                    SaleLine { item_id: scarce.id, qty: 2 },
                ],
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InsufficientStock { .. }));
        assert_eq!(lot_qtys(&pool, company, stocked.id).await, vec![5]);
        assert_eq!(lot_qtys(&pool, company, scarce.id).await, vec![1]);
        assert!(
            ledger_service::list_entries(&pool, company, account.id)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
