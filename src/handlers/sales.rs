//! Sale HTTP handlers.
//!
//! - POST /api/v1/sales/close - Consume a sale's stock and recognize its cash

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::sale::{CloseSaleRequest, SaleCloseResponse},
    services::sale_service,
};
use axum::{Extension, Json, extract::State, http::StatusCode};

/// Close a sale.
///
/// # Response
///
/// - **Success (201 Created)**: first close; entry, allocations and cost
/// - **Success (200 OK)**: sale already closed; original entry, nothing consumed
/// - **Error (422)**: a line lacks stock; the sale is not closed
pub async fn close_sale(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CloseSaleRequest>,
) -> Result<(StatusCode, Json<SaleCloseResponse>), AppError> {
    let closed = sale_service::close_sale(&pool, auth.company_id, request).await?;
    let status = if closed.already_recognized {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(closed)))
}
