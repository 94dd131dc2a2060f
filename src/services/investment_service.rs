//! Investment service - investor attributions through purchase, sale and payout.
//!
//! Lifecycle transitions are guarded in SQL (`WHERE status = <expected>`),
//! so a record can only ever move `available → sold → paid`.
//!
//! # Partial consumption
//!
//! When a sale consumes part of a lot, the attributed share of the consumed
//! units is proportional to the lot's attributed share, rounded half up, and
//! never less than what the unattributed share can absorb. That share is
//! taken from the lot's `available` attributions in creation order; an
//! attribution only partly covered is split into a `sold` record and the
//! `available` remainder, so per lot and investor
//! `available + sold + paid` stays equal to the attributed quantity.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        investment::{
            InvestmentItem, InvestmentStatus, InvestorSummary, PayInvestorRequest, Payout,
            StatusTotals,
        },
        ledger_entry::{EntryKind, EntrySource, NewLedgerEntry},
        stock_lot::StockLot,
    },
    services::ledger_service,
};

/// An `available` attribution of a lot, as seen by the split planner.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AvailableShare {
    pub id: Uuid,
    pub qty: i64,
}

/// What to do with one attribution when its lot is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoldAction {
    /// The whole attribution is sold.
    MarkSold { id: Uuid },

    /// `sold_qty` becomes a new `sold` record; `remaining_qty` stays available.
    Split {
        id: Uuid,
        sold_qty: i64,
        remaining_qty: i64,
    },
}

/// Attributed units among `consumed` units taken from a lot holding
/// `lot_qty` units, `attributed` of which belong to investors.
pub fn attributed_share(lot_qty: i64, attributed: i64, consumed: i64) -> i64 {
    if lot_qty <= 0 || attributed <= 0 || consumed <= 0 {
        return 0;
    }
    let attributed = attributed.min(lot_qty);
    let consumed = consumed.min(lot_qty);
    let unattributed = lot_qty - attributed;

    let (wide_lot, wide_consumed, wide_attributed) =
        (i128::from(lot_qty), i128::from(consumed), i128::from(attributed));
    let proportional =
        (2 * wide_consumed * wide_attributed + wide_lot).div_euclid(2 * wide_lot) as i64;
    proportional
        .max(consumed - unattributed)
        .min(attributed)
        .min(consumed)
}

/// Plan the `available → sold` transitions for one lot consumption.
///
/// `shares` must be in creation order.
pub fn plan_sold_split(lot_qty: i64, consumed: i64, shares: &[AvailableShare]) -> Vec<SoldAction> {
    let attributed: i64 = shares.iter().map(|share| share.qty).sum();
    let mut to_sell = attributed_share(lot_qty, attributed, consumed);

    let mut actions = Vec::new();
    for share in shares {
        if to_sell == 0 {
            break;
        }
        if share.qty <= to_sell {
            actions.push(SoldAction::MarkSold { id: share.id });
            to_sell -= share.qty;
        } else {
            actions.push(SoldAction::Split {
                id: share.id,
                sold_qty: to_sell,
                remaining_qty: share.qty - to_sell,
            });
            to_sell = 0;
        }
    }

    actions
}

/// Create an `available` attribution for a lot funded by an investor.
pub async fn attribute_at_purchase(
    conn: &mut PgConnection,
    investor_id: Uuid,
    purchase_id: Option<Uuid>,
    lot: &StockLot,
    purchase_price: i64,
) -> Result<InvestmentItem, AppError> {
    if lot.qty <= 0 {
        return Err(AppError::InvalidQuantity);
    }

    let attribution = sqlx::query_as::<_, InvestmentItem>(
        r#"
        INSERT INTO investment_items (
            company_id,
            investor_id,
            purchase_id,
            item_id,
            stock_lot_id,
            purchase_price,
            qty,
            status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'available')
        RETURNING *
        "#,
    )
    .bind(lot.company_id)
    .bind(investor_id)
    .bind(purchase_id)
    .bind(lot.item_id)
    .bind(lot.id)
    .bind(purchase_price)
    .bind(lot.qty)
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(
        investor_id = %investor_id,
        lot_id = %lot.id,
        qty = attribution.qty,
        "lot attributed to investor"
    );

    Ok(attribution)
}

/// Move the attributed share of a lot consumption to `sold`.
///
/// Called by the FIFO allocator while it holds the item lock. Returns the
/// number of records now `sold` because of this call. Attributed units can
/// only leave through a sale; without `sale_id` this fails with
/// `InvalidRequest` and the caller's transaction is discarded.
pub async fn mark_sold_in_tx(
    conn: &mut PgConnection,
    lot_id: Uuid,
    lot_qty: i64,
    consumed: i64,
    sale_id: Option<Uuid>,
) -> Result<usize, AppError> {
    let shares = sqlx::query_as::<_, AvailableShare>(
        r#"
        SELECT id, qty FROM investment_items
        WHERE stock_lot_id = $1 AND status = 'available'
        ORDER BY seq ASC
        FOR UPDATE
        "#,
    )
    .bind(lot_id)
    .fetch_all(&mut *conn)
    .await?;

    if shares.is_empty() {
        return Ok(0);
    }

    let actions = plan_sold_split(lot_qty, consumed, &shares);
    if !actions.is_empty() && sale_id.is_none() {
        return Err(AppError::InvalidRequest(
            "Investor-attributed stock can only be consumed by a sale".to_string(),
        ));
    }

    for action in &actions {
        match *action {
            SoldAction::MarkSold { id } => {
                sqlx::query(
                    r#"
                    UPDATE investment_items
                    SET status = 'sold', sale_id = $2, sold_at = NOW()
                    WHERE id = $1 AND status = 'available'
                    "#,
                )
                .bind(id)
                .bind(sale_id)
                .execute(&mut *conn)
                .await?;
            }
            SoldAction::Split {
                id,
                sold_qty,
                remaining_qty,
            } => {
                sqlx::query(
                    "UPDATE investment_items SET qty = $2 WHERE id = $1 AND status = 'available'",
                )
                .bind(id)
                .bind(remaining_qty)
                .execute(&mut *conn)
                .await?;

                sqlx::query(
                    r#"
                    INSERT INTO investment_items (
                        company_id, investor_id, purchase_id, item_id, stock_lot_id,
                        purchase_price, qty, status, sale_id, sold_at
                    )
                    SELECT company_id, investor_id, purchase_id, item_id, stock_lot_id,
                           purchase_price, $2, 'sold', $3, NOW()
                    FROM investment_items
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(sold_qty)
                .bind(sale_id)
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    if !actions.is_empty() {
        tracing::info!(
            lot_id = %lot_id,
            sale_id = ?sale_id,
            records = actions.len(),
            "investor attributions sold"
        );
    }

    Ok(actions.len())
}

/// Pay an investor for sold attributions.
///
/// # Process
///
/// 1. Lock the selected `sold` attributions
/// 2. Append one `OUT` entry for Σ purchase_price × qty on the
///    disbursement account
/// 3. Move the attributions to `paid`, linking the entry
///
/// All in one transaction.
///
/// # Errors
///
/// - `NothingToPay`: no sold attribution selected
/// - `InvalidRequest`: a listed attribution is unknown, not sold, or
///   belongs to another investor
/// - `AccountNotFound`: no account given and no disbursement account set
pub async fn pay_investor(
    pool: &DbPool,
    company_id: Uuid,
    investor_id: Uuid,
    request: PayInvestorRequest,
) -> Result<Payout, AppError> {
    let mut tx = pool.begin().await?;

    let attributions = match request.attribution_ids {
        Some(ids) => {
            let ids: Vec<Uuid> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
            if ids.is_empty() {
                return Err(AppError::NothingToPay);
            }

            let rows = sqlx::query_as::<_, InvestmentItem>(
                r#"
                SELECT * FROM investment_items
                WHERE company_id = $1 AND investor_id = $2 AND id = ANY($3)
                ORDER BY seq ASC
                FOR UPDATE
                "#,
            )
            .bind(company_id)
            .bind(investor_id)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

            if rows.len() != ids.len() {
                return Err(AppError::InvalidRequest(
                    "unknown attribution for this investor".to_string(),
                ));
            }
            if let Some(row) = rows
                .iter()
                .find(|row| !row.status.can_transition_to(InvestmentStatus::Paid))
            {
                return Err(AppError::InvalidRequest(format!(
                    "attribution {} is {}, only sold attributions can be paid",
                    row.id, row.status
                )));
            }
            rows
        }
        None => {
            sqlx::query_as::<_, InvestmentItem>(
                r#"
                SELECT * FROM investment_items
                WHERE company_id = $1 AND investor_id = $2 AND status = 'sold'
                ORDER BY seq ASC
                FOR UPDATE
                "#,
            )
            .bind(company_id)
            .bind(investor_id)
            .fetch_all(&mut *tx)
            .await?
        }
    };

    if attributions.is_empty() {
        return Err(AppError::NothingToPay);
    }

    let amount = attributions
        .iter()
        .try_fold(0i64, |total, row| {
            row.purchase_price
                .checked_mul(row.qty)
                .and_then(|line| total.checked_add(line))
        })
        .ok_or(AppError::InvalidAmount)?;
    let ids: Vec<Uuid> = attributions.iter().map(|row| row.id).collect();

    let account_id = match request.account_id {
        Some(id) => id,
        None => sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT disbursement_account_id FROM companies WHERE id = $1",
        )
        .bind(company_id)
        .fetch_optional(&mut *tx)
        .await?
        .flatten()
        .ok_or(AppError::AccountNotFound)?,
    };

    let outcome = ledger_service::append_entry_in_tx(
        &mut tx,
        &NewLedgerEntry {
            company_id,
            account_id,
            kind: EntryKind::Out,
            amount,
            source: EntrySource::InvestorPayout,
            source_ref: Some(investor_id.to_string()),
            date: request.date,
            meta: Some(serde_json::json!({ "attribution_ids": ids })),
        },
    )
    .await?;

    let paid = sqlx::query(
        r#"
        UPDATE investment_items
        SET status = 'paid', paid_at = $3, cashflow_entry_id = $2
        WHERE id = ANY($1) AND status = 'sold'
        "#,
    )
    .bind(&ids)
    .bind(outcome.entry.id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if paid as usize != ids.len() {
        tx.rollback().await?;
        return Err(AppError::InvalidRequest(
            "attributions changed while paying".to_string(),
        ));
    }

    tx.commit().await?;

    tracing::info!(
        company_id = %company_id,
        investor_id = %investor_id,
        entry_id = %outcome.entry.id,
        amount,
        attributions = ids.len(),
        "investor paid"
    );

    Ok(Payout {
        investor_id,
        cashflow_entry_id: outcome.entry.id,
        amount,
        attribution_ids: ids,
    })
}

/// Delete an attribution that has nothing sold.
///
/// # Errors
///
/// - `NotFound("Investment")`: no such attribution for this company
/// - `AttributionLocked`: the attribution is `sold` or `paid`
pub async fn delete_attribution(
    pool: &DbPool,
    company_id: Uuid,
    attribution_id: Uuid,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let status: InvestmentStatus = sqlx::query_scalar(
        "SELECT status FROM investment_items WHERE id = $1 AND company_id = $2 FOR UPDATE",
    )
    .bind(attribution_id)
    .bind(company_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Investment"))?;

    if !status.is_deletable() {
        return Err(AppError::AttributionLocked { status });
    }

    sqlx::query("DELETE FROM investment_items WHERE id = $1 AND status = 'available'")
        .bind(attribution_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(attribution_id = %attribution_id, "available attribution deleted");
    Ok(())
}

/// List an investor's attributions in creation order.
pub async fn list_attributions(
    pool: &DbPool,
    company_id: Uuid,
    investor_id: Uuid,
) -> Result<Vec<InvestmentItem>, AppError> {
    let rows = sqlx::query_as::<_, InvestmentItem>(
        r#"
        SELECT * FROM investment_items
        WHERE company_id = $1 AND investor_id = $2
        ORDER BY seq ASC
        "#,
    )
    .bind(company_id)
    .bind(investor_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Quantity and value per lifecycle state for one investor.
pub async fn investor_summary(
    pool: &DbPool,
    company_id: Uuid,
    investor_id: Uuid,
) -> Result<InvestorSummary, AppError> {
    let rows: Vec<(InvestmentStatus, i64, i64)> = sqlx::query_as(
        r#"
        SELECT status,
               COALESCE(SUM(qty), 0)::BIGINT,
               COALESCE(SUM(qty * purchase_price), 0)::BIGINT
        FROM investment_items
        WHERE company_id = $1 AND investor_id = $2
        GROUP BY status
        "#,
    )
    .bind(company_id)
    .bind(investor_id)
    .fetch_all(pool)
    .await?;

    let mut summary = InvestorSummary {
        investor_id,
        ..InvestorSummary::default()
    };
    for (status, qty, amount) in rows {
        let totals = StatusTotals { qty, amount };
        match status {
            InvestmentStatus::Available => summary.available = totals,
            InvestmentStatus::Sold => summary.sold = totals,
            InvestmentStatus::Paid => summary.paid = totals,
        }
    }

    tracing::debug!(investor_id = %investor_id, qty = summary.total_qty(), "investor summary");
    Ok(summary)
}


#[cfg(test)]
mod scenarios {
    use super::*;
    use crate::{
        models::purchase::{CreatePurchaseRequest, PurchaseLineRequest},
        services::{purchase_service, stock_service},
        test_support::{seed_account, seed_company, seed_item, set_disbursement_account},
    };

    async fn funded_purchase(pool: &DbPool, company: Uuid, investor: Uuid, item_id: Uuid) -> Uuid {
        let purchase = purchase_service::create_purchase(
            pool,
            company,
            CreatePurchaseRequest {
                supplier_id: None,
                investor_id: Some(investor),
                entry_price: None,
                entry_date: None,
                lines: vec![PurchaseLineRequest {
                    item_id,
                    qty: 10,
                    unit_price: 500,
                }],
            },
        )
        .await
        .unwrap();
        assert_eq!(purchase.attribution_ids.len(), 1);
        purchase.lot_ids[0]
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn attribution_moves_through_sold_to_paid(pool: DbPool) {
        let company = seed_company(&pool).await;
        let cash = seed_account(&pool, company, 50_000).await;
        set_disbursement_account(&pool, company, cash.id).await;
        let item = seed_item(&pool, company, "FRAME-M").await;
        let investor = Uuid::new_v4();
        funded_purchase(&pool, company, investor, item.id).await;

        let sale_id = Uuid::new_v4();
        let consumption = stock_service::consume_fifo(&pool, company, item.id, 4, Some(sale_id))
            .await
            .unwrap();
        assert_eq!(consumption.attributions_sold, 1);
        let rows = list_attributions(&pool, company, investor).await.unwrap();
        assert!(rows
            .iter()
            .filter(|row| row.status == InvestmentStatus::Sold)
            .all(|row| row.sale_id == Some(sale_id)));

        let summary = investor_summary(&pool, company, investor).await.unwrap();
        assert_eq!(summary.available, StatusTotals { qty: 6, amount: 3_000 });
        assert_eq!(summary.sold, StatusTotals { qty: 4, amount: 2_000 });
        assert_eq!(summary.total_qty(), 10);

        let payout = pay_investor(&pool, company, investor, PayInvestorRequest::default())
            .await
            .unwrap();
        assert_eq!(payout.amount, 2_000);
        assert_eq!(
            ledger_service::current_balance(&pool, company, cash.id).await.unwrap(),
            48_000
        );

        let summary = investor_summary(&pool, company, investor).await.unwrap();
        assert_eq!(summary.sold, StatusTotals::default());
        assert_eq!(summary.paid.qty, 4);
        assert_eq!(summary.total_qty(), 10);

        let err = pay_investor(&pool, company, investor, PayInvestorRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NothingToPay));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn only_available_attributions_can_be_deleted(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "FRAME-L").await;
        let investor = Uuid::new_v4();
        funded_purchase(&pool, company, investor, item.id).await;
        stock_service::consume_fifo(&pool, company, item.id, 4, Some(Uuid::new_v4()))
            .await
            .unwrap();

        let rows = list_attributions(&pool, company, investor).await.unwrap();
        let available = rows
            .iter()
            .find(|row| row.status == InvestmentStatus::Available)
            .unwrap();
        let sold = rows
            .iter()
            .find(|row| row.status == InvestmentStatus::Sold)
            .unwrap();

        let err = delete_attribution(&pool, company, sold.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::AttributionLocked {
                status: InvestmentStatus::Sold
            }
        ));

        delete_attribution(&pool, company, available.id).await.unwrap();

        let summary = investor_summary(&pool, company, investor).await.unwrap();
        assert_eq!(summary.available, StatusTotals::default());
        assert_eq!(summary.sold.qty, 4);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn attributed_stock_cannot_be_written_off_without_a_sale(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "STEM").await;
        let investor = Uuid::new_v4();
        let lot_id = funded_purchase(&pool, company, investor, item.id).await;

        let err = stock_service::consume_fifo(&pool, company, item.id, 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        // Nothing consumed, nothing became payable.
        let lots = stock_service::list_lots(&pool, company, item.id).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!((lots[0].id, lots[0].qty), (lot_id, 10));
        let summary = investor_summary(&pool, company, investor).await.unwrap();
        assert_eq!(summary.available.qty, 10);
        assert_eq!(summary.sold, StatusTotals::default());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn payout_without_disbursement_account_fails(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "FORK").await;
        let investor = Uuid::new_v4();
        funded_purchase(&pool, company, investor, item.id).await;
        stock_service::consume_fifo(&pool, company, item.id, 10, Some(Uuid::new_v4()))
            .await
            .unwrap();

        let err = pay_investor(&pool, company, investor, PayInvestorRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccountNotFound));

        // Nothing moved to paid.
        let summary = investor_summary(&pool, company, investor).await.unwrap();
        assert_eq!(summary.sold.qty, 10);
    }
}
