//! Item data models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an item record from the database.
///
/// # Database Table
///
/// Maps to the `items` table. `(company_id, sku)` is unique.
///
/// # Stock
///
/// `stock` is a cached aggregate. The authoritative quantity is the sum of
/// the item's lot quantities; receive and consume keep both in step inside
/// one transaction, and the orphan repair job re-derives `stock` from the
/// lots when they drift.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Item {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock: i64,
    pub sale_price: i64,
    pub entry_price: Option<i64>,

    /// Entry price was averaged from peers of the same intake, not given
    pub entry_price_is_auto: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating an item.
///
/// When `entry_price` is absent and `intake_id` is present, the price is
/// resolved from items of the same name received through that intake.
/// `initial_qty > 0` with an `intake_id` also receives a first lot.
///
/// # JSON Example
///
/// ```json
/// {
///   "sku": "BRK-PAD-04",
///   "name": "Brake pad set",
///   "sale_price": 45000,
///   "intake_id": "660e8400-e29b-41d4-a716-446655440001",
///   "initial_qty": 4
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub sku: String,
    pub name: String,

    #[serde(default)]
    pub sale_price: i64,

    pub entry_price: Option<i64>,
    pub intake_id: Option<Uuid>,

    #[serde(default)]
    pub initial_qty: i64,
}

/// Response body for item endpoints, with the lot sum alongside the cache.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock: i64,

    /// Sum of lot quantities; equals `stock` unless drift awaits repair
    pub lot_stock: i64,

    pub sale_price: i64,
    pub entry_price: Option<i64>,
    pub entry_price_is_auto: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemResponse {
    pub fn new(item: Item, lot_stock: i64) -> Self {
        Self {
            id: item.id,
            sku: item.sku,
            name: item.name,
            stock: item.stock,
            lot_stock,
            sale_price: item.sale_price,
            entry_price: item.entry_price,
            entry_price_is_auto: item.entry_price_is_auto,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}
