//! Investor HTTP handlers.
//!
//! - GET /api/v1/investors/{id}/summary - Quantity and value per lifecycle state
//! - GET /api/v1/investors/{id}/attributions - All attributions of an investor
//! - POST /api/v1/investors/{id}/payouts - Pay sold attributions
//! - DELETE /api/v1/investments/{id} - Delete an available attribution

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::investment::{InvestmentItem, InvestorSummary, PayInvestorRequest, Payout},
    services::investment_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

pub async fn investor_summary(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(investor_id): Path<Uuid>,
) -> Result<Json<InvestorSummary>, AppError> {
    let summary = investment_service::investor_summary(&pool, auth.company_id, investor_id).await?;
    Ok(Json(summary))
}

pub async fn list_attributions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(investor_id): Path<Uuid>,
) -> Result<Json<Vec<InvestmentItem>>, AppError> {
    let rows = investment_service::list_attributions(&pool, auth.company_id, investor_id).await?;
    Ok(Json(rows))
}

/// Pay an investor.
///
/// # Request Body
///
/// ```json
/// {
///   "attribution_ids": ["aa0e8400-..."],
///   "account_id": "550e8400-..."
/// }
/// ```
///
/// Both fields are optional: by default every sold attribution is paid
/// from the company's disbursement account.
pub async fn pay_investor(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(investor_id): Path<Uuid>,
    Json(request): Json<PayInvestorRequest>,
) -> Result<(StatusCode, Json<Payout>), AppError> {
    let payout =
        investment_service::pay_investor(&pool, auth.company_id, investor_id, request).await?;
    Ok((StatusCode::CREATED, Json(payout)))
}

/// Delete an attribution. 409 Conflict once it is sold or paid.
pub async fn delete_attribution(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(attribution_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    investment_service::delete_attribution(&pool, auth.company_id, attribution_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
