//! Sale-close request and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ledger_entry::LedgerEntryResponse, stock_lot::Consumption};

#[derive(Debug, Clone, Deserialize)]
pub struct SaleLine {
    pub item_id: Uuid,
    pub qty: i64,
}

/// Request body for closing a sale.
///
/// # JSON Example
///
/// ```json
/// {
///   "sale_id": "990e8400-e29b-41d4-a716-446655440004",
///   "account_id": "550e8400-e29b-41d4-a716-446655440000",
///   "total_amount": 100000,
///   "lines": [
///     { "item_id": "aa0e8400-e29b-41d4-a716-446655440005", "qty": 2 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CloseSaleRequest {
    pub sale_id: Uuid,
    pub account_id: Uuid,
    pub total_amount: i64,
    pub date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub lines: Vec<SaleLine>,
}

/// Result of closing a sale.
///
/// `already_recognized` is true when the sale had been closed before; in
/// that case `consumptions` is empty and `entry` is the original entry.
#[derive(Debug, Serialize)]
pub struct SaleCloseResponse {
    pub sale_id: Uuid,
    pub entry: LedgerEntryResponse,
    pub already_recognized: bool,
    pub consumptions: Vec<Consumption>,

    /// FIFO cost of goods sold across all lines
    pub cost_of_goods: i64,
}
