//! Purchase service - receiving a purchase as lots and investor attributions.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::purchase::{
        CreatePurchaseRequest, Purchase, PurchaseLine, PurchaseLineRequest, PurchaseResponse,
    },
    services::{
        investment_service,
        stock_service::{self, ReceiveStock},
    },
};

/// Indices of `lines` in the order their items are locked: by item id,
/// request order among lines of the same item.
pub fn lock_order(lines: &[PurchaseLineRequest]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lines.len()).collect();
    order.sort_by_key(|&index| lines[index].item_id);
    order
}

/// Create a purchase and receive its lines.
///
/// # Process
///
/// 1. Validate the lines
/// 2. Insert the purchase with its total
/// 3. For each line, in item id order: insert it, receive a lot
///    (`intake_id` = purchase id, entry price = unit price) and, when the
///    purchase names an investor, attribute the lot to them
///
/// Everything happens in one transaction. Lines, lots and attributions are
/// returned in request order.
///
/// # Errors
///
/// - `InvalidRequest`: no lines
/// - `InvalidQuantity`: a line quantity is zero or negative
/// - `InvalidAmount`: a negative unit or entry price, a zero unit price on an
///   investor purchase, or a total beyond the `i64` range
/// - `ItemNotFound`: a line names an unknown item
pub async fn create_purchase(
    pool: &DbPool,
    company_id: Uuid,
    request: CreatePurchaseRequest,
) -> Result<PurchaseResponse, AppError> {
    if request.lines.is_empty() {
        return Err(AppError::InvalidRequest(
            "A purchase needs at least one line".to_string(),
        ));
    }
    if request.lines.iter().any(|line| line.qty <= 0) {
        return Err(AppError::InvalidQuantity);
    }
    if request.lines.iter().any(|line| line.unit_price < 0)
        || request.entry_price.is_some_and(|price| price < 0)
    {
        return Err(AppError::InvalidAmount);
    }
    // An investor is paid back purchase_price x qty; a free line could never be paid.
    if request.investor_id.is_some() && request.lines.iter().any(|line| line.unit_price == 0) {
        return Err(AppError::InvalidAmount);
    }

    let total_amount = request
        .lines
        .iter()
        .try_fold(0i64, |total, line| {
            line.qty
                .checked_mul(line.unit_price)
                .and_then(|line_total| total.checked_add(line_total))
        })
        .ok_or(AppError::InvalidAmount)?;

    let mut tx = pool.begin().await?;

    let purchase = sqlx::query_as::<_, Purchase>(
        r#"
        INSERT INTO purchases (company_id, supplier_id, investor_id, entry_price, total_amount)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(company_id)
    .bind(request.supplier_id)
    .bind(request.investor_id)
    .bind(request.entry_price)
    .bind(total_amount)
    .fetch_one(&mut *tx)
    .await?;

    let mut received = Vec::with_capacity(request.lines.len());

    for index in lock_order(&request.lines) {
        let line = &request.lines[index];
        let stored = sqlx::query_as::<_, PurchaseLine>(
            r#"
            INSERT INTO purchase_lines (purchase_id, item_id, qty, unit_price)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(purchase.id)
        .bind(line.item_id)
        .bind(line.qty)
        .bind(line.unit_price)
        .fetch_one(&mut *tx)
        .await?;

        let lot = stock_service::receive_stock_in_tx(
            &mut tx,
            company_id,
            line.item_id,
            &ReceiveStock {
                intake_id: Some(purchase.id),
                qty: line.qty,
                entry_price: Some(line.unit_price),
                entry_date: request.entry_date,
            },
        )
        .await?;

        let attribution_id = match purchase.investor_id {
            Some(investor_id) => Some(
                investment_service::attribute_at_purchase(
                    &mut tx,
                    investor_id,
                    Some(purchase.id),
                    &lot,
                    line.unit_price,
                )
                .await?
                .id,
            ),
            None => None,
        };

        received.push((index, stored, lot.id, attribution_id));
    }

    received.sort_by_key(|(index, ..)| *index);
    let mut lines = Vec::with_capacity(received.len());
    let mut lot_ids = Vec::with_capacity(received.len());
    let mut attribution_ids = Vec::new();
    for (_, stored, lot_id, attribution_id) in received {
        lines.push(stored);
        lot_ids.push(lot_id);
        attribution_ids.extend(attribution_id);
    }

    tx.commit().await?;

    tracing::info!(
        company_id = %company_id,
        purchase_id = %purchase.id,
        investor_id = ?purchase.investor_id,
        lines = lines.len(),
        total_amount,
        "purchase received"
    );

    Ok(PurchaseResponse {
        purchase,
        lines,
        lot_ids,
        attribution_ids,
    })
}

/// Delete a purchase record.
///
/// Its lines go with it, but its lots and attributions stay: the lots may
/// already have fed sales. They are re-tagged as GENERAL stock by the
/// orphan repair job.
pub async fn delete_purchase(
    pool: &DbPool,
    company_id: Uuid,
    purchase_id: Uuid,
) -> Result<(), AppError> {
    let deleted = sqlx::query("DELETE FROM purchases WHERE id = $1 AND company_id = $2")
        .bind(purchase_id)
        .bind(company_id)
        .execute(pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("Purchase"));
    }

    let orphaned_lots: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM stock_lots WHERE intake_id = $1")
            .bind(purchase_id)
            .fetch_one(pool)
            .await?;

    tracing::info!(
        company_id = %company_id,
        purchase_id = %purchase_id,
        orphaned_lots,
        "purchase deleted, lots await orphan repair"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(item_id: Uuid) -> PurchaseLineRequest {
        PurchaseLineRequest {
            item_id,
            qty: 1,
            unit_price: 100,
        }
    }

    #[test]
    fn lines_lock_in_item_id_order() {
        let (low, high) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let lines = vec![line(high), line(low), line(high), line(low)];
        assert_eq!(lock_order(&lines), vec![1, 3, 0, 2]);
    }

    #[test]
    fn sorted_lines_keep_their_order() {
        let lines: Vec<_> = (1..=4).map(|n| line(Uuid::from_u128(n))).collect();
        assert_eq!(lock_order(&lines), vec![0, 1, 2, 3]);
        assert!(lock_order(&[]).is_empty());
    }
}
