//! Stock lot models.
//!
//! A lot is a quantity of one item received at one point in time from one
//! intake. Lots are the unit of FIFO consumption: oldest `entry_date` first,
//! insertion order (`seq`) as tie-break.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a stock lot record from the database.
///
/// # Database Table
///
/// Maps to the `stock_lots` table. A lot whose `qty` reaches 0 is kept for
/// audit. `intake_id = NULL` marks GENERAL stock, either received without
/// an intake or re-tagged after its purchase was deleted.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct StockLot {
    pub id: Uuid,
    pub seq: i64,
    pub company_id: Uuid,
    pub item_id: Uuid,
    pub intake_id: Option<Uuid>,
    pub qty: i64,
    pub entry_price: Option<i64>,
    pub entry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Request body for receiving stock into an item.
///
/// # JSON Example
///
/// ```json
/// {
///   "qty": 10,
///   "intake_id": "660e8400-e29b-41d4-a716-446655440001",
///   "entry_price": 12000,
///   "entry_date": "2025-12-01T09:00:00Z"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub qty: i64,
    pub intake_id: Option<Uuid>,
    pub entry_price: Option<i64>,
    pub entry_date: Option<DateTime<Utc>>,
}

/// Request body for a stand-alone FIFO consumption (stock move, write-off).
#[derive(Debug, Deserialize)]
pub struct ConsumeStockRequest {
    pub qty: i64,
    pub sale_id: Option<Uuid>,
}

/// Quantity taken from one lot by a FIFO consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotAllocation {
    pub lot_id: Uuid,
    pub qty: i64,
    pub entry_price: Option<i64>,
}

/// Outcome of consuming stock from one item.
#[derive(Debug, Clone, Serialize)]
pub struct Consumption {
    pub item_id: Uuid,
    pub qty: i64,
    pub allocations: Vec<LotAllocation>,

    /// FIFO cost of the consumed units; lots without a price count as 0
    pub cost: i64,

    /// Investor attributions moved to `sold` by this consumption
    pub attributions_sold: usize,
}
