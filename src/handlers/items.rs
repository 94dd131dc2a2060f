//! Item and stock HTTP handlers.
//!
//! - POST /api/v1/items - Create item (entry price resolved from its intake)
//! - GET /api/v1/items - List items with lot sums
//! - GET /api/v1/items/{id} - Get item with lot sum
//! - GET /api/v1/items/{id}/lots - Lots in FIFO order
//! - POST /api/v1/items/{id}/receive - Receive stock as a new lot
//! - POST /api/v1/items/{id}/consume - Consume stock FIFO

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        item::{CreateItemRequest, ItemResponse},
        stock_lot::{Consumption, ConsumeStockRequest, ReceiveStockRequest, StockLot},
    },
    services::stock_service::{self, ReceiveStock},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

pub async fn create_item(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ItemResponse>), AppError> {
    let item = stock_service::create_item(&pool, auth.company_id, request).await?;
    let lot_stock = item.stock;
    Ok((StatusCode::CREATED, Json(ItemResponse::new(item, lot_stock))))
}

pub async fn list_items(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ItemResponse>>, AppError> {
    let items = stock_service::list_items(&pool, auth.company_id).await?;
    Ok(Json(
        items
            .into_iter()
            .map(|(item, lot_stock)| ItemResponse::new(item, lot_stock))
            .collect(),
    ))
}

pub async fn get_item(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ItemResponse>, AppError> {
    let (item, lot_stock) = stock_service::get_item(&pool, auth.company_id, item_id).await?;
    Ok(Json(ItemResponse::new(item, lot_stock)))
}

pub async fn list_lots(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Vec<StockLot>>, AppError> {
    let lots = stock_service::list_lots(&pool, auth.company_id, item_id).await?;
    Ok(Json(lots))
}

/// Receive stock into an item.
///
/// # Request Body
///
/// ```json
/// {
///   "qty": 10,
///   "intake_id": "660e8400-...",
///   "entry_price": 12000
/// }
/// ```
pub async fn receive_stock(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
    Json(request): Json<ReceiveStockRequest>,
) -> Result<(StatusCode, Json<StockLot>), AppError> {
    let lot = stock_service::receive_stock(
        &pool,
        auth.company_id,
        item_id,
        ReceiveStock {
            intake_id: request.intake_id,
            qty: request.qty,
            entry_price: request.entry_price,
            entry_date: request.entry_date,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(lot)))
}

/// Consume stock oldest-lot-first outside of a sale (stock move, write-off).
///
/// # Response
///
/// - **Success (200 OK)**: the lots consumed and their FIFO cost
/// - **Error (422)**: not enough stock; nothing was consumed
/// - **Error (400)**: an investor-attributed lot would be consumed without a
///   `sale_id`
pub async fn consume_stock(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
    Json(request): Json<ConsumeStockRequest>,
) -> Result<Json<Consumption>, AppError> {
    let consumption =
        stock_service::consume_fifo(&pool, auth.company_id, item_id, request.qty, request.sale_id)
            .await?;
    Ok(Json(consumption))
}
