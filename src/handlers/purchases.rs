//! Purchase HTTP handlers.
//!
//! - POST /api/v1/purchases - Receive a purchase as lots (and attributions)
//! - DELETE /api/v1/purchases/{id} - Delete a purchase, orphaning its lots

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::purchase::{CreatePurchaseRequest, PurchaseResponse},
    services::purchase_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Create a purchase.
///
/// # Response
///
/// - **Success (201 Created)**: purchase, lines, and ids of the lots and
///   attributions it created
/// - **Error (404)**: a line names an unknown item; nothing is stored
pub async fn create_purchase(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreatePurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let purchase = purchase_service::create_purchase(&pool, auth.company_id, request).await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// Delete a purchase. Returns 204 No Content.
pub async fn delete_purchase(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(purchase_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    purchase_service::delete_purchase(&pool, auth.company_id, purchase_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
