//! Ledger entry data models and API request/response types.
//!
//! A ledger entry is an immutable, signed cash movement on one account. It
//! caches the account balance after the movement (`balance_after`), so the
//! current balance is a single-row read instead of a replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum EntryKind {
    In,
    Out,
}

impl EntryKind {
    /// Apply a positive `amount` to `balance` in this direction.
    ///
    /// `None` when the result leaves the `i64` range.
    pub fn apply(&self, balance: i64, amount: i64) -> Option<i64> {
        match self {
            EntryKind::In => balance.checked_add(amount),
            EntryKind::Out => balance.checked_sub(amount),
        }
    }
}

/// What produced an entry.
///
/// Only `Sale` entries are deduplicated: one entry per `(company, source_ref)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrySource {
    Sale,
    Manual,
    InvestorPayout,
}

/// Represents a ledger entry record from the database.
///
/// # Database Table
///
/// Maps to the `ledger_entries` table.
///
/// # Chain Invariant
///
/// For one `(company_id, account_id)`, entries ordered by `(entry_date, seq)`
/// satisfy `balance_after[i] = balance_after[i-1] ± amount[i]`, seeded by the
/// account's `initial_balance`. Only the balance repair may rewrite
/// `balance_after`; `amount` and `kind` never change.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,

    /// Insertion order, tie-break for entries sharing an `entry_date`
    pub seq: i64,

    pub company_id: Uuid,

    pub account_id: Uuid,

    pub entry_date: DateTime<Utc>,

    pub kind: EntryKind,

    /// Always positive; the sign comes from `kind`
    pub amount: i64,

    pub source: EntrySource,

    /// Sale id for `SALE` entries, investor id for payouts
    pub source_ref: Option<String>,

    /// Cached account balance after this entry
    pub balance_after: i64,

    /// Free-form metadata, e.g. `{"type": "loan"}` from payroll
    pub meta: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

/// Everything needed to append an entry.
///
/// Built by the HTTP handler for manual entries and by the sale-close and
/// payout workflows.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub company_id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub amount: i64,
    pub source: EntrySource,
    pub source_ref: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub meta: Option<serde_json::Value>,
}

/// Request to append a manual cash movement.
///
/// # JSON Example
///
/// ```json
/// {
///   "account_id": "550e8400-e29b-41d4-a716-446655440000",
///   "kind": "OUT",
///   "amount": 30000,
///   "date": "2025-12-21T16:00:00Z",
///   "meta": { "type": "loan", "employee_id": "e-17" }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ManualEntryRequest {
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub amount: i64,
    pub date: Option<DateTime<Utc>>,
    pub meta: Option<serde_json::Value>,
}

/// Response returned for ledger entry operations.
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub entry_date: DateTime<Utc>,
    pub kind: EntryKind,
    pub amount: i64,
    pub source: EntrySource,
    pub source_ref: Option<String>,
    pub balance_after: i64,
    pub meta: serde_json::Value,
}

/// Drops the internal `seq` and `company_id` fields.
impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            account_id: entry.account_id,
            entry_date: entry.entry_date,
            kind: entry.kind,
            amount: entry.amount,
            source: entry.source,
            source_ref: entry.source_ref,
            balance_after: entry.balance_after,
            meta: entry.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_applies_sign() {
        assert_eq!(EntryKind::In.apply(100, 30), Some(130));
        assert_eq!(EntryKind::Out.apply(100, 130), Some(-30));
    }

    #[test]
    fn apply_refuses_to_overflow() {
        assert_eq!(EntryKind::In.apply(1, i64::MAX), None);
        assert_eq!(EntryKind::Out.apply(-2, i64::MAX), None);
        assert_eq!(EntryKind::In.apply(0, i64::MAX), Some(i64::MAX));
    }

    #[test]
    fn kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&EntryKind::Out).unwrap(), "\"OUT\"");
        assert_eq!(
            serde_json::to_string(&EntrySource::InvestorPayout).unwrap(),
            "\"INVESTOR_PAYOUT\""
        );
    }
}
