//! Investment attribution models.
//!
//! An attribution links a quantity of one lot to the investor whose capital
//! funded it, and follows it through the lifecycle
//! `available → sold → paid`. Records are never moved backwards; only
//! `available` ones may be deleted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum InvestmentStatus {
    Available,
    Sold,
    Paid,
}

impl InvestmentStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: InvestmentStatus) -> bool {
        matches!(
            (self, next),
            (InvestmentStatus::Available, InvestmentStatus::Sold)
                | (InvestmentStatus::Sold, InvestmentStatus::Paid)
        )
    }

    /// Only attributions with nothing sold may be deleted.
    pub fn is_deletable(&self) -> bool {
        *self == InvestmentStatus::Available
    }
}

/// Same spelling as the stored column, for error messages.
impl fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvestmentStatus::Available => "available",
            InvestmentStatus::Sold => "sold",
            InvestmentStatus::Paid => "paid",
        })
    }
}

/// Represents an investment attribution record from the database.
///
/// # Database Table
///
/// Maps to the `investment_items` table. `purchase_id`, `item_id` and
/// `stock_lot_id` are plain ids without foreign keys; the reconciliation jobs
/// remove records whose parents disappeared.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct InvestmentItem {
    pub id: Uuid,

    /// Creation order; attributions of one lot are sold in this order
    pub seq: i64,

    pub company_id: Uuid,
    pub investor_id: Uuid,
    pub purchase_id: Option<Uuid>,
    pub item_id: Uuid,
    pub stock_lot_id: Uuid,

    /// Unit price the investor paid
    pub purchase_price: i64,

    pub qty: i64,
    pub status: InvestmentStatus,
    pub sale_id: Option<Uuid>,
    pub sold_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,

    /// Ledger entry that paid the investor out
    pub cashflow_entry_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

/// Request body for paying an investor.
///
/// Without `attribution_ids`, every `sold` attribution of the investor is
/// paid. Without `account_id`, the company's disbursement account is used.
#[derive(Debug, Default, Deserialize)]
pub struct PayInvestorRequest {
    pub attribution_ids: Option<Vec<Uuid>>,
    pub account_id: Option<Uuid>,
    pub date: Option<DateTime<Utc>>,
}

/// Result of an investor payout.
#[derive(Debug, Serialize)]
pub struct Payout {
    pub investor_id: Uuid,
    pub cashflow_entry_id: Uuid,
    pub amount: i64,
    pub attribution_ids: Vec<Uuid>,
}

/// Quantity and value held in one lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StatusTotals {
    pub qty: i64,
    pub amount: i64,
}

/// Per-status totals for one investor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvestorSummary {
    pub investor_id: Uuid,
    pub available: StatusTotals,
    pub sold: StatusTotals,
    pub paid: StatusTotals,
}

impl InvestorSummary {
    /// Quantity across all states; never exceeds what was attributed.
    pub fn total_qty(&self) -> i64 {
        self.available.qty + self.sold.qty + self.paid.qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_moves_forward() {
        use InvestmentStatus::*;
        assert!(Available.can_transition_to(Sold));
        assert!(Sold.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Sold));
        assert!(!Sold.can_transition_to(Available));
        assert!(!Available.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Available));
    }

    #[test]
    fn only_available_is_deletable() {
        assert!(InvestmentStatus::Available.is_deletable());
        assert!(!InvestmentStatus::Sold.is_deletable());
        assert!(!InvestmentStatus::Paid.is_deletable());
    }
}
