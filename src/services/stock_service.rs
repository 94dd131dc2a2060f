//! Stock service - lots, FIFO consumption and entry-price resolution.
//!
//! # Atomicity Guarantees
//!
//! Receiving and consuming stock lock the item row (`FOR UPDATE`) before
//! touching its lots, so two consumers of the same item are serialized and
//! cannot both spend the last unit. A failed consumption writes nothing.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        item::{CreateItemRequest, Item},
        stock_lot::{Consumption, LotAllocation, StockLot},
    },
    services::investment_service,
};

/// Stock to receive into one item.
#[derive(Debug, Clone)]
pub struct ReceiveStock {
    pub intake_id: Option<Uuid>,
    pub qty: i64,
    pub entry_price: Option<i64>,
    pub entry_date: Option<DateTime<Utc>>,
}

/// A lot with stock left, as seen by the FIFO planner.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LotCandidate {
    pub id: Uuid,
    pub seq: i64,
    pub qty: i64,
    pub entry_price: Option<i64>,
    pub entry_date: DateTime<Utc>,
}

/// Planned decrement of one lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTake {
    pub lot_id: Uuid,

    /// Lot quantity before this consumption
    pub lot_qty: i64,

    pub take: i64,
    pub entry_price: Option<i64>,
}

/// Not enough stock across all lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub available: i64,
}

/// Plan a FIFO consumption of `needed` units.
///
/// Lots are taken oldest `entry_date` first, insertion order as tie-break,
/// regardless of the order they are passed in. Either the whole quantity is
/// planned or a [`Shortfall`] is returned; there is no partial plan.
pub fn plan_fifo(lots: &[LotCandidate], needed: i64) -> Result<Vec<PlannedTake>, Shortfall> {
    let available: i64 = lots.iter().map(|lot| lot.qty.max(0)).sum();
    if available < needed {
        return Err(Shortfall { available });
    }

    let mut ordered: Vec<&LotCandidate> = lots.iter().filter(|lot| lot.qty > 0).collect();
    ordered.sort_by_key(|lot| (lot.entry_date, lot.seq));

    let mut remaining = needed;
    let mut plan = Vec::new();
    for lot in ordered {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.qty);
        plan.push(PlannedTake {
            lot_id: lot.id,
            lot_qty: lot.qty,
            take,
            entry_price: lot.entry_price,
        });
        remaining -= take;
    }

    Ok(plan)
}

/// Average of peer entry prices in minor units, rounded half up.
pub fn average_entry_price(prices: &[i64]) -> Option<i64> {
    if prices.is_empty() {
        return None;
    }
    let count = prices.len() as i128;
    let sum: i128 = prices.iter().map(|&price| i128::from(price)).sum();
    i64::try_from((2 * sum + count).div_euclid(2 * count)).ok()
}

async fn lock_item(
    conn: &mut PgConnection,
    company_id: Uuid,
    item_id: Uuid,
) -> Result<Item, AppError> {
    sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1 AND company_id = $2 FOR UPDATE")
        .bind(item_id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::ItemNotFound)
}

/// Receive stock as a new lot in its own transaction.
pub async fn receive_stock(
    pool: &DbPool,
    company_id: Uuid,
    item_id: Uuid,
    receive: ReceiveStock,
) -> Result<StockLot, AppError> {
    let mut tx = pool.begin().await?;
    let lot = receive_stock_in_tx(&mut tx, company_id, item_id, &receive).await?;
    tx.commit().await?;
    Ok(lot)
}

/// Receive stock as a new lot inside an open transaction.
///
/// Each receipt is its own lot, even for an intake that already delivered
/// this item; `entry_date` (default now) fixes its FIFO position. The item's
/// cached `stock` grows by the same quantity.
///
/// # Errors
///
/// - `InvalidQuantity`: qty is zero or negative
/// - `ItemNotFound`: item doesn't exist for this company
/// - `NotFound("Intake")`: intake_id doesn't name a purchase of this company
pub async fn receive_stock_in_tx(
    conn: &mut PgConnection,
    company_id: Uuid,
    item_id: Uuid,
    receive: &ReceiveStock,
) -> Result<StockLot, AppError> {
    if receive.qty <= 0 {
        return Err(AppError::InvalidQuantity);
    }

    lock_item(conn, company_id, item_id).await?;

    if let Some(intake_id) = receive.intake_id {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM purchases WHERE id = $1 AND company_id = $2)",
        )
        .bind(intake_id)
        .bind(company_id)
        .fetch_one(&mut *conn)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Intake"));
        }
    }

    let lot = sqlx::query_as::<_, StockLot>(
        r#"
        INSERT INTO stock_lots (company_id, item_id, intake_id, qty, entry_price, entry_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(company_id)
    .bind(item_id)
    .bind(receive.intake_id)
    .bind(receive.qty)
    .bind(receive.entry_price)
    .bind(receive.entry_date.unwrap_or_else(Utc::now))
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE items SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
        .bind(receive.qty)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;

    tracing::info!(
        company_id = %company_id,
        item_id = %item_id,
        lot_id = %lot.id,
        qty = lot.qty,
        "stock received"
    );

    Ok(lot)
}

/// Consume stock FIFO in its own transaction.
pub async fn consume_fifo(
    pool: &DbPool,
    company_id: Uuid,
    item_id: Uuid,
    qty: i64,
    sale_id: Option<Uuid>,
) -> Result<Consumption, AppError> {
    let mut tx = pool.begin().await?;
    let consumption = consume_fifo_in_tx(&mut tx, company_id, item_id, qty, sale_id).await?;
    tx.commit().await?;
    Ok(consumption)
}

/// Consume `qty` units of an item, oldest lots first, inside an open transaction.
///
/// # Process
///
/// 1. Lock the item row
/// 2. Load its lots with stock left
/// 3. Plan the consumption; fail with `InsufficientStock` before any write
/// 4. Decrement the planned lots and the item's cached stock
/// 5. Move investor attributions of the consumed lots to `sold`
///
/// Lots belonging to a deleted purchase are consumed like any other.
pub async fn consume_fifo_in_tx(
    conn: &mut PgConnection,
    company_id: Uuid,
    item_id: Uuid,
    qty: i64,
    sale_id: Option<Uuid>,
) -> Result<Consumption, AppError> {
    if qty <= 0 {
        return Err(AppError::InvalidQuantity);
    }

    lock_item(conn, company_id, item_id).await?;

    let lots = sqlx::query_as::<_, LotCandidate>(
        r#"
        SELECT id, seq, qty, entry_price, entry_date FROM stock_lots
        WHERE company_id = $1 AND item_id = $2 AND qty > 0
        ORDER BY entry_date ASC, seq ASC
        FOR UPDATE
        "#,
    )
    .bind(company_id)
    .bind(item_id)
    .fetch_all(&mut *conn)
    .await?;

    let plan = plan_fifo(&lots, qty).map_err(|shortfall| AppError::InsufficientStock {
        item_id,
        requested: qty,
        available: shortfall.available,
    })?;

    tracing::debug!(item_id = %item_id, lots = plan.len(), "fifo plan");

    let mut allocations = Vec::with_capacity(plan.len());
    let mut cost = 0;
    let mut attributions_sold = 0;

    for take in &plan {
        sqlx::query("UPDATE stock_lots SET qty = qty - $1 WHERE id = $2")
            .bind(take.take)
            .bind(take.lot_id)
            .execute(&mut *conn)
            .await?;

        attributions_sold +=
            investment_service::mark_sold_in_tx(conn, take.lot_id, take.lot_qty, take.take, sale_id)
                .await?;

        cost = take
            .take
            .checked_mul(take.entry_price.unwrap_or(0))
            .and_then(|line_cost| line_cost.checked_add(cost))
            .ok_or(AppError::InvalidAmount)?;
        allocations.push(LotAllocation {
            lot_id: take.lot_id,
            qty: take.take,
            entry_price: take.entry_price,
        });
    }

    // The cache may lag behind the lots until the next resync.
    sqlx::query(
        "UPDATE items SET stock = GREATEST(stock - $1, 0), updated_at = NOW() WHERE id = $2",
    )
    .bind(qty)
    .bind(item_id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        company_id = %company_id,
        item_id = %item_id,
        qty,
        lots = allocations.len(),
        cost,
        attributions_sold,
        "stock consumed"
    );

    Ok(Consumption {
        item_id,
        qty,
        allocations,
        cost,
        attributions_sold,
    })
}

/// Resolve the entry price of a new item that has none but came in through
/// an intake.
///
/// Averages the entry prices of items with the same name already received
/// through that intake; falls back to the intake's own entry price.
pub async fn resolve_entry_price(
    conn: &mut PgConnection,
    company_id: Uuid,
    name: &str,
    intake_id: Uuid,
) -> Result<Option<i64>, AppError> {
    let peers: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT i.entry_price FROM items i
        WHERE i.company_id = $1
          AND i.name = $2
          AND i.entry_price IS NOT NULL
          AND EXISTS (
              SELECT 1 FROM stock_lots l
              WHERE l.item_id = i.id AND l.intake_id = $3
          )
        "#,
    )
    .bind(company_id)
    .bind(name)
    .bind(intake_id)
    .fetch_all(&mut *conn)
    .await?;

    if let Some(average) = average_entry_price(&peers) {
        return Ok(Some(average));
    }

    let intake_price: Option<Option<i64>> =
        sqlx::query_scalar("SELECT entry_price FROM purchases WHERE id = $1 AND company_id = $2")
            .bind(intake_id)
            .bind(company_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(intake_price.flatten())
}

/// Create an item, resolving a missing entry price and receiving its
/// initial quantity as a first lot.
///
/// # Errors
///
/// - `InvalidRequest`: sku or name empty, or sku already used by this company
/// - `InvalidQuantity`: negative initial quantity
/// - `InvalidAmount`: negative prices
pub async fn create_item(
    pool: &DbPool,
    company_id: Uuid,
    request: CreateItemRequest,
) -> Result<Item, AppError> {
    if request.sku.trim().is_empty() || request.name.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "sku and name are required".to_string(),
        ));
    }
    if request.initial_qty < 0 {
        return Err(AppError::InvalidQuantity);
    }
    if request.sale_price < 0 || request.entry_price.is_some_and(|price| price < 0) {
        return Err(AppError::InvalidAmount);
    }

    let mut tx = pool.begin().await?;

    let (entry_price, entry_price_is_auto) = match (request.entry_price, request.intake_id) {
        (Some(price), _) => (Some(price), false),
        (None, Some(intake_id)) => {
            let resolved = resolve_entry_price(&mut tx, company_id, &request.name, intake_id).await?;
            (resolved, resolved.is_some())
        }
        (None, None) => (None, false),
    };

    let item = sqlx::query_as::<_, Item>(
        r#"
        INSERT INTO items (company_id, sku, name, sale_price, entry_price, entry_price_is_auto)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(company_id)
    .bind(request.sku.trim())
    .bind(request.name.trim())
    .bind(request.sale_price)
    .bind(entry_price)
    .bind(entry_price_is_auto)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::InvalidRequest(format!("sku {} already exists", request.sku.trim()))
        }
        other => AppError::Database(other),
    })?;

    let item = if request.initial_qty > 0 {
        let receive = ReceiveStock {
            intake_id: request.intake_id,
            qty: request.initial_qty,
            entry_price,
            entry_date: None,
        };
        receive_stock_in_tx(&mut tx, company_id, item.id, &receive).await?;
        Item {
            stock: request.initial_qty,
            ..item
        }
    } else {
        item
    };

    tx.commit().await?;

    tracing::info!(
        company_id = %company_id,
        item_id = %item.id,
        sku = %item.sku,
        entry_price_is_auto,
        "item created"
    );

    Ok(item)
}

/// Fetch an item together with the sum of its lot quantities.
pub async fn get_item(
    pool: &DbPool,
    company_id: Uuid,
    item_id: Uuid,
) -> Result<(Item, i64), AppError> {
    let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1 AND company_id = $2")
        .bind(item_id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::ItemNotFound)?;

    let lot_stock = lot_sum(pool, item_id).await?;
    Ok((item, lot_stock))
}

/// Sum of an item's lot quantities (the authoritative stock).
pub async fn lot_sum(pool: &DbPool, item_id: Uuid) -> Result<i64, AppError> {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(qty), 0)::BIGINT FROM stock_lots WHERE item_id = $1 AND qty > 0",
    )
    .bind(item_id)
    .fetch_one(pool)
    .await?;

    Ok(sum)
}

/// List a company's items with their lot sums, by sku.
pub async fn list_items(pool: &DbPool, company_id: Uuid) -> Result<Vec<(Item, i64)>, AppError> {
    let items =
        sqlx::query_as::<_, Item>("SELECT * FROM items WHERE company_id = $1 ORDER BY sku ASC")
            .bind(company_id)
            .fetch_all(pool)
            .await?;

    let mut with_lots = Vec::with_capacity(items.len());
    for item in items {
        let sum = lot_sum(pool, item.id).await?;
        with_lots.push((item, sum));
    }

    Ok(with_lots)
}

/// List an item's lots in FIFO order, exhausted lots included.
pub async fn list_lots(
    pool: &DbPool,
    company_id: Uuid,
    item_id: Uuid,
) -> Result<Vec<StockLot>, AppError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1 AND company_id = $2)")
            .bind(item_id)
            .bind(company_id)
            .fetch_one(pool)
            .await?;

    if !exists {
        return Err(AppError::ItemNotFound);
    }

    let lots = sqlx::query_as::<_, StockLot>(
        r#"
        SELECT * FROM stock_lots
        WHERE company_id = $1 AND item_id = $2
        ORDER BY entry_date ASC, seq ASC
        "#,
    )
    .bind(company_id)
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    Ok(lots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn lot(seq: i64, qty: i64, date: DateTime<Utc>) -> LotCandidate {
        LotCandidate {
            id: Uuid::new_v4(),
            seq,
            qty,
            entry_price: Some(100 * seq),
            entry_date: date,
        }
    }

    #[test]
    fn consumes_oldest_lots_first() {
        let lots = vec![lot(1, 3, day(1)), lot(2, 4, day(2)), lot(3, 5, day(3))];
        let plan = plan_fifo(&lots, 5).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!((plan[0].lot_id, plan[0].take), (lots[0].id, 3));
        assert_eq!((plan[1].lot_id, plan[1].take), (lots[1].id, 2));

        let remaining: Vec<i64> = lots
            .iter()
            .map(|l| l.qty - plan.iter().filter(|p| p.lot_id == l.id).map(|p| p.take).sum::<i64>())
            .collect();
        assert_eq!(remaining, vec![0, 2, 5]);
    }

    #[test]
    fn over_consumption_is_rejected_whole() {
        let lots = vec![lot(1, 3, day(1)), lot(2, 4, day(2)), lot(3, 5, day(3))];
        assert_eq!(plan_fifo(&lots, 13), Err(Shortfall { available: 12 }));
    }

    #[test]
    fn entry_date_beats_insertion_order() {
        let newer_inserted_first = lot(1, 2, day(5));
        let older_inserted_later = lot(2, 2, day(1));
        let lots = vec![newer_inserted_first.clone(), older_inserted_later.clone()];

        let plan = plan_fifo(&lots, 3).unwrap();
        assert_eq!(plan[0].lot_id, older_inserted_later.id);
        assert_eq!(plan[1].lot_id, newer_inserted_first.id);
        assert_eq!(plan[1].take, 1);
    }

    #[test]
    fn same_date_falls_back_to_insertion_order() {
        let lots = vec![lot(7, 1, day(1)), lot(3, 1, day(1))];
        let plan = plan_fifo(&lots, 1).unwrap();
        assert_eq!(plan[0].lot_id, lots[1].id);
    }

    #[test]
    fn empty_lots_are_skipped() {
        let lots = vec![lot(1, 0, day(1)), lot(2, 2, day(2))];
        let plan = plan_fifo(&lots, 2).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].lot_id, lots[1].id);
        assert_eq!(plan[0].lot_qty, 2);
    }

    #[test]
    fn average_rounds_half_up() {
        assert_eq!(average_entry_price(&[]), None);
        assert_eq!(average_entry_price(&[1000]), Some(1000));
        assert_eq!(average_entry_price(&[1000, 1001]), Some(1001));
        assert_eq!(average_entry_price(&[1000, 1000, 1001]), Some(1000));
    }

    #[test]
    fn average_of_large_prices_does_not_overflow() {
        assert_eq!(
            average_entry_price(&[i64::MAX / 2, i64::MAX / 2]),
            Some(i64::MAX / 2)
        );
        assert_eq!(average_entry_price(&[i64::MAX, i64::MAX]), Some(i64::MAX));
    }

    proptest! {
        #[test]
        fn plan_conserves_quantity(
            qtys in prop::collection::vec(0i64..50, 0..12),
            dates in prop::collection::vec(0i64..30, 12),
            needed in 1i64..400,
        ) {
            let lots: Vec<LotCandidate> = qtys
                .iter()
                .enumerate()
                .map(|(i, q)| lot(i as i64, *q, day(dates[i])))
                .collect();
            let total: i64 = qtys.iter().sum();

            match plan_fifo(&lots, needed) {
                Ok(plan) => {
                    prop_assert!(needed <= total);
                    prop_assert_eq!(plan.iter().map(|p| p.take).sum::<i64>(), needed);
                    for p in &plan {
                        prop_assert!(p.take > 0 && p.take <= p.lot_qty);
                    }
                    // Every lot but the last in the plan is drained.
                    for p in plan.iter().take(plan.len().saturating_sub(1)) {
                        prop_assert_eq!(p.take, p.lot_qty);
                    }
                }
                Err(shortfall) => {
                    prop_assert!(needed > total);
                    prop_assert_eq!(shortfall.available, total);
                }
            }
        }
    }
}

#[cfg(test)]
mod scenarios {
    use super::*;
    use crate::test_support::{cached_stock, day, lot_qtys, seed_company, seed_item, seed_lot};

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn consumes_lots_in_entry_date_order(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "BOLT-M6").await;

        // Inserted out of date order on purpose.
        seed_lot(&pool, company, item.id, 4, 110, day(2)).await;
        seed_lot(&pool, company, item.id, 3, 100, day(1)).await;
        seed_lot(&pool, company, item.id, 5, 120, day(3)).await;

        let consumption = consume_fifo(&pool, company, item.id, 5, None).await.unwrap();

        assert_eq!(consumption.allocations.len(), 2);
        assert_eq!(consumption.cost, 3 * 100 + 2 * 110);
        assert_eq!(lot_qtys(&pool, company, item.id).await, vec![0, 2, 5]);
        assert_eq!(cached_stock(&pool, item.id).await, 7);
        assert_eq!(lot_sum(&pool, item.id).await.unwrap(), 7);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn insufficient_stock_writes_nothing(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "BOLT-M8").await;
        for (n, qty) in [(1, 3), (2, 4), (3, 5)] {
            seed_lot(&pool, company, item.id, qty, 100, day(n)).await;
        }

        let err = consume_fifo(&pool, company, item.id, 13, None).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientStock {
                requested: 13,
                available: 12,
                ..
            }
        ));

        assert_eq!(lot_qtys(&pool, company, item.id).await, vec![3, 4, 5]);
        assert_eq!(cached_stock(&pool, item.id).await, 12);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn last_unit_goes_to_exactly_one_consumer(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "SPOKE").await;
        seed_lot(&pool, company, item.id, 1, 100, day(1)).await;

        let item_id = item.id;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                consume_fifo(&pool, company, item_id, 1, None).await
            }));
        }

        let mut consumed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(consumption) => {
                    assert_eq!(consumption.cost, 100);
                    consumed += 1;
                }
                Err(err) => assert!(matches!(
                    err,
                    AppError::InsufficientStock { available: 0, .. }
                )),
            }
        }

        assert_eq!(consumed, 1);
        assert_eq!(lot_qtys(&pool, company, item.id).await, vec![0]);
        assert_eq!(cached_stock(&pool, item.id).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn cost_beyond_range_writes_nothing(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "HUB").await;
        seed_lot(&pool, company, item.id, 2, i64::MAX, day(1)).await;

        let err = consume_fifo(&pool, company, item.id, 2, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount));
        assert_eq!(lot_qtys(&pool, company, item.id).await, vec![2]);
        assert_eq!(cached_stock(&pool, item.id).await, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn initial_quantity_becomes_a_lot(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = create_item(
            &pool,
            company,
            CreateItemRequest {
                sku: "NUT-M6".to_string(),
                name: "Nut M6".to_string(),
                sale_price: 50,
                entry_price: Some(20),
                intake_id: None,
                initial_qty: 9,
            },
        )
        .await
        .unwrap();

        assert_eq!(item.stock, 9);
        assert_eq!(lot_sum(&pool, item.id).await.unwrap(), 9);
        let lots = list_lots(&pool, company, item.id).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].entry_price, Some(20));
        assert_eq!(lots[0].intake_id, None);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn entry_price_is_averaged_from_intake_peers(pool: DbPool) {
        let company = seed_company(&pool).await;
        let intake: Uuid = sqlx::query_scalar(
            "INSERT INTO purchases (company_id, entry_price) VALUES ($1, 700) RETURNING id",
        )
        .bind(company)
        .fetch_one(&pool)
        .await
        .unwrap();

        let request = |sku: &str, entry_price: Option<i64>| CreateItemRequest {
            sku: sku.to_string(),
            name: "Brake pad".to_string(),
            sale_price: 0,
            entry_price,
            intake_id: Some(intake),
            initial_qty: 1,
        };

        // Nothing received yet: the intake's own price applies.
        let first = create_item(&pool, company, request("PAD-1", None)).await.unwrap();
        assert_eq!(first.entry_price, Some(700));
        assert!(first.entry_price_is_auto);

        create_item(&pool, company, request("PAD-2", Some(1001))).await.unwrap();

        // Peers: 700 and 1001 -> 850.5 rounds half up.
        let third = create_item(&pool, company, request("PAD-3", None)).await.unwrap();
        assert_eq!(third.entry_price, Some(851));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn unknown_intake_is_rejected(pool: DbPool) {
        let company = seed_company(&pool).await;
        let item = seed_item(&pool, company, "WASHER").await;

        let err = receive_stock(
            &pool,
            company,
            item.id,
            ReceiveStock {
                intake_id: Some(Uuid::new_v4()),
                qty: 1,
                entry_price: None,
                entry_date: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound("Intake")));
        assert_eq!(cached_stock(&pool, item.id).await, 0);
    }
}
