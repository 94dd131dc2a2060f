//! Reconciliation jobs - idempotent repair of drifted ledger and stock state.
//!
//! Each job takes an optional company scope, runs to completion and returns
//! a [`RepairReport`]. A record whose repair fails is logged and counted in
//! `failures`; the batch carries on. Every record is repaired under the same
//! row lock live traffic uses, so jobs may run alongside requests, and a
//! second run with no new events changes nothing.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::report::{RepairJob, RepairReport},
    services::ledger_service,
};

/// Run one job by name.
pub async fn run(
    pool: &DbPool,
    job: RepairJob,
    company_id: Option<Uuid>,
) -> Result<RepairReport, AppError> {
    match job {
        RepairJob::BalanceRepair => repair_balances(pool, company_id).await,
        RepairJob::OrphanRepair => repair_orphans(pool, company_id).await,
        RepairJob::InvestorCleanup => cleanup_investors(pool, company_id).await,
    }
}

fn log_report(report: &RepairReport, company_id: Option<Uuid>) {
    tracing::info!(
        job = %report.job,
        company_id = ?company_id,
        processed = report.processed,
        fixed = report.fixed,
        failures = report.failures,
        "repair job finished"
    );
}

/// Replay every account's chain and rewrite drifted `balance_after` values.
pub async fn repair_balances(
    pool: &DbPool,
    company_id: Option<Uuid>,
) -> Result<RepairReport, AppError> {
    let accounts: Vec<(Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT id, company_id FROM accounts
        WHERE ($1::uuid IS NULL OR company_id = $1)
        ORDER BY company_id, created_at, id
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    let mut report = RepairReport::new(RepairJob::BalanceRepair);

    for (account_id, owner) in accounts {
        match repair_one_account(pool, owner, account_id).await {
            Ok(repair) => {
                if repair.fixed > 0 {
                    tracing::info!(
                        account_id = %account_id,
                        fixed = repair.fixed,
                        "balance chain repaired"
                    );
                }
                report.absorb(repair.processed, repair.fixed);
            }
            Err(err) => {
                tracing::warn!(account_id = %account_id, error = %err, "balance repair failed");
                report.failures += 1;
            }
        }
    }

    log_report(&report, company_id);
    Ok(report)
}

async fn repair_one_account(
    pool: &DbPool,
    company_id: Uuid,
    account_id: Uuid,
) -> Result<ledger_service::ChainRepair, AppError> {
    let mut tx = pool.begin().await?;
    let account = ledger_service::lock_account(&mut tx, company_id, account_id).await?;
    let repair = ledger_service::repair_account_chain(&mut tx, &account).await?;
    tx.commit().await?;
    Ok(repair)
}

/// Repair references left dangling by deleted purchases and items, then
/// resync every item's cached stock with its lots.
///
/// # Steps
///
/// 1. Lots whose intake no longer exists become GENERAL stock
/// 2. Purchase lines naming deleted items are pruned
/// 3. Attributions whose purchase or item no longer exists are deleted
/// 4. `items.stock` is reset to the sum of its lots with stock left
pub async fn repair_orphans(
    pool: &DbPool,
    company_id: Option<Uuid>,
) -> Result<RepairReport, AppError> {
    let mut report = RepairReport::new(RepairJob::OrphanRepair);

    retag_orphan_lots(pool, company_id, &mut report).await?;
    prune_orphan_lines(pool, company_id, &mut report).await?;
    delete_orphan_attributions(pool, company_id, &mut report).await?;
    resync_item_stock(pool, company_id, &mut report).await?;

    log_report(&report, company_id);
    Ok(report)
}

async fn retag_orphan_lots(
    pool: &DbPool,
    company_id: Option<Uuid>,
    report: &mut RepairReport,
) -> Result<(), AppError> {
    let lots: Vec<(Uuid, Uuid, bool)> = sqlx::query_as(
        r#"
        SELECT l.id, l.intake_id,
               NOT EXISTS (SELECT 1 FROM purchases p WHERE p.id = l.intake_id)
        FROM stock_lots l
        WHERE l.intake_id IS NOT NULL
          AND ($1::uuid IS NULL OR l.company_id = $1)
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    for (lot_id, intake_id, orphaned) in lots {
        report.processed += 1;
        if !orphaned {
            continue;
        }

        tracing::warn!(lot_id = %lot_id, intake_id = %intake_id, "orphan lot, re-tagging as general stock");

        let result = sqlx::query(
            r#"
            UPDATE stock_lots SET intake_id = NULL
            WHERE id = $1 AND intake_id = $2
              AND NOT EXISTS (SELECT 1 FROM purchases p WHERE p.id = $2)
            "#,
        )
        .bind(lot_id)
        .bind(intake_id)
        .execute(pool)
        .await;

        match result {
            Ok(done) => report.fixed += done.rows_affected(),
            Err(err) => {
                tracing::warn!(lot_id = %lot_id, error = %err, "lot re-tag failed");
                report.failures += 1;
            }
        }
    }

    Ok(())
}

async fn prune_orphan_lines(
    pool: &DbPool,
    company_id: Option<Uuid>,
    report: &mut RepairReport,
) -> Result<(), AppError> {
    let lines: Vec<(Uuid, Uuid, bool)> = sqlx::query_as(
        r#"
        SELECT pl.id, pl.item_id,
               NOT EXISTS (SELECT 1 FROM items i WHERE i.id = pl.item_id)
        FROM purchase_lines pl
        JOIN purchases p ON p.id = pl.purchase_id
        WHERE ($1::uuid IS NULL OR p.company_id = $1)
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    for (line_id, item_id, orphaned) in lines {
        report.processed += 1;
        if !orphaned {
            continue;
        }

        tracing::warn!(line_id = %line_id, item_id = %item_id, "purchase line names a deleted item, pruning");

        let result = sqlx::query(
            r#"
            DELETE FROM purchase_lines
            WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM items i WHERE i.id = $2)
            "#,
        )
        .bind(line_id)
        .bind(item_id)
        .execute(pool)
        .await;

        match result {
            Ok(done) => report.fixed += done.rows_affected(),
            Err(err) => {
                tracing::warn!(line_id = %line_id, error = %err, "purchase line prune failed");
                report.failures += 1;
            }
        }
    }

    Ok(())
}

async fn delete_orphan_attributions(
    pool: &DbPool,
    company_id: Option<Uuid>,
    report: &mut RepairReport,
) -> Result<(), AppError> {
    let rows: Vec<(Uuid, bool)> = sqlx::query_as(
        r#"
        SELECT ii.id,
               (ii.purchase_id IS NOT NULL
                    AND NOT EXISTS (SELECT 1 FROM purchases p WHERE p.id = ii.purchase_id))
               OR NOT EXISTS (SELECT 1 FROM items i WHERE i.id = ii.item_id)
        FROM investment_items ii
        WHERE ($1::uuid IS NULL OR ii.company_id = $1)
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    for (attribution_id, orphaned) in rows {
        report.processed += 1;
        if !orphaned {
            continue;
        }

        tracing::warn!(attribution_id = %attribution_id, "attribution lost its purchase or item, deleting");

        let result = sqlx::query(
            r#"
            DELETE FROM investment_items ii
            WHERE ii.id = $1
              AND ((ii.purchase_id IS NOT NULL
                        AND NOT EXISTS (SELECT 1 FROM purchases p WHERE p.id = ii.purchase_id))
                   OR NOT EXISTS (SELECT 1 FROM items i WHERE i.id = ii.item_id))
            "#,
        )
        .bind(attribution_id)
        .execute(pool)
        .await;

        match result {
            Ok(done) => report.fixed += done.rows_affected(),
            Err(err) => {
                tracing::warn!(attribution_id = %attribution_id, error = %err, "attribution delete failed");
                report.failures += 1;
            }
        }
    }

    Ok(())
}

async fn resync_item_stock(
    pool: &DbPool,
    company_id: Option<Uuid>,
    report: &mut RepairReport,
) -> Result<(), AppError> {
    let items: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM items WHERE ($1::uuid IS NULL OR company_id = $1) ORDER BY id",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    for item_id in items {
        report.processed += 1;
        match resync_one_item(pool, item_id).await {
            Ok(fixed) => report.fixed += u64::from(fixed),
            Err(err) => {
                tracing::warn!(item_id = %item_id, error = %err, "stock resync failed");
                report.failures += 1;
            }
        }
    }

    Ok(())
}

/// Reset one item's cached stock to its lot sum; true when it had drifted.
async fn resync_one_item(pool: &DbPool, item_id: Uuid) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let cached: Option<i64> = sqlx::query_scalar("SELECT stock FROM items WHERE id = $1 FOR UPDATE")
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(cached) = cached else {
        // Deleted since the scan.
        return Ok(false);
    };

    let lot_sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(qty), 0)::BIGINT FROM stock_lots WHERE item_id = $1 AND qty > 0",
    )
    .bind(item_id)
    .fetch_one(&mut *tx)
    .await?;

    if cached == lot_sum {
        return Ok(false);
    }

    sqlx::query("UPDATE items SET stock = $1, updated_at = NOW() WHERE id = $2")
        .bind(lot_sum)
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::warn!(item_id = %item_id, cached, lot_sum, "item stock resynced with lots");
    Ok(true)
}

/// Delete `available` attributions whose lot or item no longer exists.
///
/// `sold` and `paid` records are left alone: they trace real sales and
/// disbursements.
pub async fn cleanup_investors(
    pool: &DbPool,
    company_id: Option<Uuid>,
) -> Result<RepairReport, AppError> {
    let rows: Vec<(Uuid, bool)> = sqlx::query_as(
        r#"
        SELECT ii.id,
               NOT EXISTS (SELECT 1 FROM stock_lots l WHERE l.id = ii.stock_lot_id)
               OR NOT EXISTS (SELECT 1 FROM items i WHERE i.id = ii.item_id)
        FROM investment_items ii
        WHERE ii.status = 'available'
          AND ($1::uuid IS NULL OR ii.company_id = $1)
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    let mut report = RepairReport::new(RepairJob::InvestorCleanup);

    for (attribution_id, orphaned) in rows {
        report.processed += 1;
        if !orphaned {
            continue;
        }

        let result = sqlx::query(
            r#"
            DELETE FROM investment_items ii
            WHERE ii.id = $1
              AND ii.status = 'available'
              AND (NOT EXISTS (SELECT 1 FROM stock_lots l WHERE l.id = ii.stock_lot_id)
                   OR NOT EXISTS (SELECT 1 FROM items i WHERE i.id = ii.item_id))
            "#,
        )
        .bind(attribution_id)
        .execute(pool)
        .await;

        match result {
            Ok(done) => {
                if done.rows_affected() > 0 {
                    tracing::warn!(attribution_id = %attribution_id, "orphan available attribution removed");
                }
                report.fixed += done.rows_affected();
            }
            Err(err) => {
                tracing::warn!(attribution_id = %attribution_id, error = %err, "investor cleanup failed");
                report.failures += 1;
            }
        }
    }

    log_report(&report, company_id);
    Ok(report)
}
