//! Ledger service - append-only cash entries with a cached running balance.
//!
//! This service handles:
//! - Appending entries with `balance_after` computed from the prior entry
//! - At-most-once recognition of a sale's cash
//! - O(1) current balance from the cached field
//! - Replaying an account's chain to repair drifted balances
//!
//! # Atomicity Guarantees
//!
//! Every append runs in a PostgreSQL transaction that first locks the
//! account row (`FOR UPDATE`). Two appends on the same account therefore
//! never read the same prior balance.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        account::Account,
        ledger_entry::{EntryKind, EntrySource, LedgerEntry, NewLedgerEntry},
    },
};

/// Result of an append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub entry: LedgerEntry,

    /// The sale had already been recognized; `entry` is the original one.
    pub duplicate: bool,
}

/// The fields of an entry that take part in the balance chain.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ChainLink {
    pub id: Uuid,
    pub kind: EntryKind,
    pub amount: i64,
    pub balance_after: i64,
}

/// A `balance_after` that must be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFix {
    pub entry_id: Uuid,
    pub stored: i64,
    pub expected: i64,
}

/// Counts for one account's chain repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainRepair {
    pub processed: u64,
    pub fixed: u64,
}

/// Walk `links` in chain order from `initial_balance` and list the entries
/// whose stored balance differs from the running sum.
///
/// The running sum continues from the expected value, not the stored one,
/// so a single corrupted entry does not hide errors after it.
///
/// # Errors
///
/// - `InvalidAmount`: the running balance leaves the `i64` range
pub fn replay_chain(initial_balance: i64, links: &[ChainLink]) -> Result<Vec<ChainFix>, AppError> {
    let mut balance = initial_balance;
    let mut fixes = Vec::new();

    for link in links {
        balance = link
            .kind
            .apply(balance, link.amount)
            .ok_or(AppError::InvalidAmount)?;
        if link.balance_after != balance {
            fixes.push(ChainFix {
                entry_id: link.id,
                stored: link.balance_after,
                expected: balance,
            });
        }
    }

    Ok(fixes)
}

/// Lock an account row for the rest of the transaction.
///
/// # Errors
///
/// - `AccountNotFound`: no such account for this company
pub async fn lock_account(
    conn: &mut PgConnection,
    company_id: Uuid,
    account_id: Uuid,
) -> Result<Account, AppError> {
    sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE id = $1 AND company_id = $2 FOR UPDATE",
    )
    .bind(account_id)
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::AccountNotFound)
}

/// Find the entry that recognized a sale, if any.
pub async fn find_sale_entry(
    conn: &mut PgConnection,
    company_id: Uuid,
    sale_ref: &str,
) -> Result<Option<LedgerEntry>, AppError> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        SELECT * FROM ledger_entries
        WHERE company_id = $1 AND source = 'SALE' AND source_ref = $2
        "#,
    )
    .bind(company_id)
    .bind(sale_ref)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(entry)
}

/// Append a ledger entry in its own transaction.
///
/// # Process
///
/// 1. Validate the amount
/// 2. Start database transaction
/// 3. Append (see [`append_entry_in_tx`])
/// 4. Commit (or rollback on error)
///
/// If a concurrent request recognized the same sale against a different
/// account, the unique index rejects this insert; the existing entry is then
/// returned as a duplicate.
///
/// # Errors
///
/// - `InvalidAmount`: amount is zero or negative
/// - `AccountNotFound`: account doesn't exist for this company
/// - `Database`: database error occurred
pub async fn append_entry(pool: &DbPool, new: NewLedgerEntry) -> Result<AppendOutcome, AppError> {
    if new.amount <= 0 {
        return Err(AppError::InvalidAmount);
    }

    let mut tx = pool.begin().await?;

    match append_entry_in_tx(&mut tx, &new).await {
        Ok(outcome) => {
            tx.commit().await?;
            Ok(outcome)
        }
        Err(AppError::Database(sqlx::Error::Database(db_err)))
            if db_err.is_unique_violation() && new.source == EntrySource::Sale =>
        {
            tx.rollback().await?;
            let sale_ref = new.source_ref.as_deref().unwrap_or_default();
            let mut conn = pool.acquire().await?;
            let entry = find_sale_entry(&mut conn, new.company_id, sale_ref)
                .await?
                .ok_or(AppError::Database(sqlx::Error::Database(db_err)))?;
            tracing::info!(
                company_id = %new.company_id,
                sale_ref,
                entry_id = %entry.id,
                "sale already recognized by a concurrent request"
            );
            Ok(AppendOutcome {
                entry,
                duplicate: true,
            })
        }
        Err(err) => Err(err),
    }
}

/// Append a ledger entry inside an open transaction.
///
/// # Process
///
/// 1. Lock the account row (serializes appends per account)
/// 2. For `SALE` entries, return the existing entry for the same sale
/// 3. Prior balance = `balance_after` of the latest entry not dated after
///    this one, or the account's `initial_balance`
/// 4. Insert with `balance_after = prior ± amount`
/// 5. If later-dated entries exist, replay the account's chain so they
///    follow the new entry
pub async fn append_entry_in_tx(
    conn: &mut PgConnection,
    new: &NewLedgerEntry,
) -> Result<AppendOutcome, AppError> {
    if new.amount <= 0 {
        return Err(AppError::InvalidAmount);
    }

    let account = lock_account(conn, new.company_id, new.account_id).await?;

    if new.source == EntrySource::Sale {
        let sale_ref = new
            .source_ref
            .as_deref()
            .ok_or_else(|| AppError::InvalidRequest("Sale entries need a source_ref".to_string()))?;

        if let Some(existing) = find_sale_entry(conn, new.company_id, sale_ref).await? {
            tracing::info!(
                company_id = %new.company_id,
                sale_ref,
                entry_id = %existing.id,
                "sale already recognized, returning existing entry"
            );
            return Ok(AppendOutcome {
                entry: existing,
                duplicate: true,
            });
        }
    }

    let entry_date = new.date.unwrap_or_else(Utc::now);

    let prior: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT balance_after FROM ledger_entries
        WHERE company_id = $1 AND account_id = $2 AND entry_date <= $3
        ORDER BY entry_date DESC, seq DESC
        LIMIT 1
        "#,
    )
    .bind(new.company_id)
    .bind(new.account_id)
    .bind(entry_date)
    .fetch_optional(&mut *conn)
    .await?;

    let balance_after = new
        .kind
        .apply(prior.unwrap_or(account.initial_balance), new.amount)
        .ok_or(AppError::InvalidAmount)?;

    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO ledger_entries (
            company_id,
            account_id,
            entry_date,
            kind,
            amount,
            source,
            source_ref,
            balance_after,
            meta
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(new.company_id)
    .bind(new.account_id)
    .bind(entry_date)
    .bind(new.kind)
    .bind(new.amount)
    .bind(new.source)
    .bind(new.source_ref.as_deref())
    .bind(balance_after)
    .bind(new.meta.clone().unwrap_or_else(|| serde_json::json!({})))
    .fetch_one(&mut *conn)
    .await?;

    let backdated: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM ledger_entries
            WHERE company_id = $1 AND account_id = $2 AND entry_date > $3
        )
        "#,
    )
    .bind(new.company_id)
    .bind(new.account_id)
    .bind(entry_date)
    .fetch_one(&mut *conn)
    .await?;

    if backdated {
        let repair = repair_account_chain(conn, &account).await?;
        tracing::warn!(
            account_id = %account.id,
            entry_id = %entry.id,
            fixed = repair.fixed,
            "backdated entry, later balances replayed"
        );
    }

    tracing::info!(
        company_id = %entry.company_id,
        account_id = %entry.account_id,
        entry_id = %entry.id,
        kind = ?entry.kind,
        source = ?entry.source,
        amount = entry.amount,
        balance_after = entry.balance_after,
        "ledger entry appended"
    );

    Ok(AppendOutcome {
        entry,
        duplicate: false,
    })
}

/// Current balance of an account.
///
/// Reads the cached `balance_after` of the latest entry; falls back to the
/// account's `initial_balance` when it has none.
///
/// # Errors
///
/// - `AccountNotFound`: account doesn't exist for this company
pub async fn current_balance(
    pool: &DbPool,
    company_id: Uuid,
    account_id: Uuid,
) -> Result<i64, AppError> {
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT COALESCE(
            (
                SELECT e.balance_after FROM ledger_entries e
                WHERE e.company_id = a.company_id AND e.account_id = a.id
                ORDER BY e.entry_date DESC, e.seq DESC
                LIMIT 1
            ),
            a.initial_balance
        )
        FROM accounts a
        WHERE a.id = $1 AND a.company_id = $2
        "#,
    )
    .bind(account_id)
    .bind(company_id)
    .fetch_optional(pool)
    .await?;

    balance.ok_or(AppError::AccountNotFound)
}

/// List an account's entries in chain order (oldest first).
pub async fn list_entries(
    pool: &DbPool,
    company_id: Uuid,
    account_id: Uuid,
) -> Result<Vec<LedgerEntry>, AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1 AND company_id = $2)",
    )
    .bind(account_id)
    .bind(company_id)
    .fetch_one(pool)
    .await?;

    if !exists {
        return Err(AppError::AccountNotFound);
    }

    let entries = sqlx::query_as::<_, LedgerEntry>(
        r#"
        SELECT * FROM ledger_entries
        WHERE company_id = $1 AND account_id = $2
        ORDER BY entry_date ASC, seq ASC
        "#,
    )
    .bind(company_id)
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Rewrite every `balance_after` of an account that diverges from the
/// replayed chain. Never touches `amount` or `kind`.
///
/// The caller must hold the account lock (see [`lock_account`]).
/// Running it twice in a row fixes nothing the second time.
pub async fn repair_account_chain(
    conn: &mut PgConnection,
    account: &Account,
) -> Result<ChainRepair, AppError> {
    let links = sqlx::query_as::<_, ChainLink>(
        r#"
        SELECT id, kind, amount, balance_after FROM ledger_entries
        WHERE company_id = $1 AND account_id = $2
        ORDER BY entry_date ASC, seq ASC
        "#,
    )
    .bind(account.company_id)
    .bind(account.id)
    .fetch_all(&mut *conn)
    .await?;

    let fixes = replay_chain(account.initial_balance, &links)?;

    for fix in &fixes {
        tracing::debug!(
            entry_id = %fix.entry_id,
            stored = fix.stored,
            expected = fix.expected,
            "rewriting balance_after"
        );
        sqlx::query("UPDATE ledger_entries SET balance_after = $1 WHERE id = $2")
            .bind(fix.expected)
            .bind(fix.entry_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(ChainRepair {
        processed: links.len() as u64,
        fixed: fixes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn link(kind: EntryKind, amount: i64, balance_after: i64) -> ChainLink {
        ChainLink {
            id: Uuid::new_v4(),
            kind,
            amount,
            balance_after,
        }
    }

    #[test]
    fn consistent_chain_needs_no_fix() {
        let links = vec![
            link(EntryKind::In, 100_000, 100_000),
            link(EntryKind::Out, 30_000, 70_000),
        ];
        assert!(replay_chain(0, &links).unwrap().is_empty());
    }

    #[test]
    fn corrupted_entry_and_its_successors_are_fixed() {
        let links = vec![
            link(EntryKind::In, 500, 1_500),
            link(EntryKind::In, 200, 9_999),
            link(EntryKind::Out, 100, 1_600),
        ];
        let fixes = replay_chain(1_000, &links).unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].entry_id, links[1].id);
        assert_eq!(fixes[0].stored, 9_999);
        assert_eq!(fixes[0].expected, 1_700);
    }

    #[test]
    fn wrong_seed_shifts_whole_chain() {
        let links = vec![
            link(EntryKind::In, 10, 10),
            link(EntryKind::In, 10, 20),
        ];
        let fixes = replay_chain(5, &links).unwrap();
        let expected: Vec<i64> = fixes.iter().map(|f| f.expected).collect();
        assert_eq!(expected, vec![15, 25]);
    }

    #[test]
    fn balance_may_go_negative() {
        let links = vec![link(EntryKind::Out, 50, -50)];
        assert!(replay_chain(0, &links).unwrap().is_empty());
    }

    #[test]
    fn replay_past_i64_range_is_rejected() {
        let links = vec![link(EntryKind::In, 10, 0)];
        let err = replay_chain(i64::MAX - 5, &links).unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount));
    }

    fn arb_links() -> impl Strategy<Value = Vec<(bool, i64, i64)>> {
        prop::collection::vec((any::<bool>(), 1i64..1_000_000, -1_000_000i64..1_000_000), 0..40)
    }

    proptest! {
        #[test]
        fn repaired_chain_ends_at_seed_plus_net_flow(
            initial in -1_000_000i64..1_000_000,
            raw in arb_links(),
        ) {
            let mut links: Vec<ChainLink> = raw
                .iter()
                .map(|(is_in, amount, garbage)| {
                    let kind = if *is_in { EntryKind::In } else { EntryKind::Out };
                    link(kind, *amount, *garbage)
                })
                .collect();

            for fix in replay_chain(initial, &links).unwrap() {
                let target = links.iter_mut().find(|l| l.id == fix.entry_id).unwrap();
                target.balance_after = fix.expected;
            }

            let net: i64 = raw
                .iter()
                .map(|(is_in, amount, _)| if *is_in { *amount } else { -*amount })
                .sum();
            if let Some(last) = links.last() {
                prop_assert_eq!(last.balance_after, initial + net);
            }
            prop_assert!(replay_chain(initial, &links).unwrap().is_empty());
        }
    }
}
