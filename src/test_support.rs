//! Seed helpers for database-backed tests.
//!
//! Used by the `#[sqlx::test]` scenarios in the service modules. Each test
//! gets a fresh database with the migrations applied.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    middleware::auth::hash_api_key,
    models::{
        account::Account,
        item::{CreateItemRequest, Item},
        ledger_entry::{EntryKind, EntrySource, NewLedgerEntry},
        stock_lot::StockLot,
    },
    services::stock_service::{self, ReceiveStock},
};

/// Midnight UTC, `n` days after 2025-01-01.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub async fn seed_company(pool: &DbPool) -> Uuid {
    sqlx::query_scalar("INSERT INTO companies (name, key_hash) VALUES ($1, $2) RETURNING id")
        .bind("Workshop")
        .bind(hash_api_key(&Uuid::new_v4().to_string()))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn seed_account(pool: &DbPool, company_id: Uuid, initial_balance: i64) -> Account {
    sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (company_id, name, account_type, initial_balance)
        VALUES ($1, $2, 'CASH', $3)
        RETURNING *
        "#,
    )
    .bind(company_id)
    .bind(format!("drawer-{}", Uuid::new_v4()))
    .bind(initial_balance)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn set_disbursement_account(pool: &DbPool, company_id: Uuid, account_id: Uuid) {
    sqlx::query("UPDATE companies SET disbursement_account_id = $1 WHERE id = $2")
        .bind(account_id)
        .bind(company_id)
        .execute(pool)
        .await
        .unwrap();
}

/// An item with no stock.
pub async fn seed_item(pool: &DbPool, company_id: Uuid, sku: &str) -> Item {
    stock_service::create_item(
        pool,
        company_id,
        CreateItemRequest {
            sku: sku.to_string(),
            name: format!("Item {sku}"),
            sale_price: 0,
            entry_price: None,
            intake_id: None,
            initial_qty: 0,
        },
    )
    .await
    .unwrap()
}

/// GENERAL-stock lot dated `entry_date`.
pub async fn seed_lot(
    pool: &DbPool,
    company_id: Uuid,
    item_id: Uuid,
    qty: i64,
    entry_price: i64,
    entry_date: DateTime<Utc>,
) -> StockLot {
    stock_service::receive_stock(
        pool,
        company_id,
        item_id,
        ReceiveStock {
            intake_id: None,
            qty,
            entry_price: Some(entry_price),
            entry_date: Some(entry_date),
        },
    )
    .await
    .unwrap()
}

pub fn manual(company_id: Uuid, account_id: Uuid, kind: EntryKind, amount: i64) -> NewLedgerEntry {
    NewLedgerEntry {
        company_id,
        account_id,
        kind,
        amount,
        source: EntrySource::Manual,
        source_ref: None,
        date: None,
        meta: None,
    }
}

pub fn sale(company_id: Uuid, account_id: Uuid, sale_ref: &str, amount: i64) -> NewLedgerEntry {
    NewLedgerEntry {
        source: EntrySource::Sale,
        source_ref: Some(sale_ref.to_string()),
        ..manual(company_id, account_id, EntryKind::In, amount)
    }
}

/// Current lot quantities of an item in FIFO order.
pub async fn lot_qtys(pool: &DbPool, company_id: Uuid, item_id: Uuid) -> Vec<i64> {
    stock_service::list_lots(pool, company_id, item_id)
        .await
        .unwrap()
        .into_iter()
        .map(|lot| lot.qty)
        .collect()
}

pub async fn cached_stock(pool: &DbPool, item_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT stock FROM items WHERE id = $1")
        .bind(item_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
