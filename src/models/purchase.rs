//! Purchase (intake) data models.
//!
//! A purchase owns the lots and investor attributions created when it was
//! received. Deleting a purchase does not delete them: the lots may already
//! have fed sales, so they are left as orphans for the repair job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a purchase record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Purchase {
    pub id: Uuid,
    pub company_id: Uuid,
    pub supplier_id: Option<Uuid>,

    /// Investor whose capital funded this purchase, if any
    pub investor_id: Option<Uuid>,

    /// Intake-level default unit cost, used when resolving item prices
    pub entry_price: Option<i64>,

    /// Σ qty × unit_price over the lines
    pub total_amount: i64,

    pub created_at: DateTime<Utc>,
}

/// One line of a purchase.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PurchaseLine {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub item_id: Uuid,
    pub qty: i64,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseLineRequest {
    pub item_id: Uuid,
    pub qty: i64,
    pub unit_price: i64,
}

/// Request body for creating a purchase.
///
/// # JSON Example
///
/// ```json
/// {
///   "supplier_id": "770e8400-e29b-41d4-a716-446655440002",
///   "investor_id": "880e8400-e29b-41d4-a716-446655440003",
///   "lines": [
///     { "item_id": "550e8400-e29b-41d4-a716-446655440000", "qty": 5, "unit_price": 12000 }
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    pub supplier_id: Option<Uuid>,
    pub investor_id: Option<Uuid>,
    pub entry_price: Option<i64>,
    pub entry_date: Option<DateTime<Utc>>,
    pub lines: Vec<PurchaseLineRequest>,
}

/// Purchase as returned to clients, with the lots and attributions it created.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub lines: Vec<PurchaseLine>,
    pub lot_ids: Vec<Uuid>,
    pub attribution_ids: Vec<Uuid>,
}
