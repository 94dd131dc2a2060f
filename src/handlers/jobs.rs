//! Reconciliation job HTTP handlers.
//!
//! - POST /api/v1/jobs/{job} - Run `balance-repair`, `orphan-repair` or
//!   `investor-cleanup` for the authenticated company

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::report::{RepairJob, RepairReport},
    services::reconciliation_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
};

/// Run a job to completion and return its summary.
///
/// # Response (200 OK)
///
/// ```json
/// { "job": "balance-repair", "processed": 42, "fixed": 1, "failures": 0 }
/// ```
pub async fn run_job(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(job): Path<String>,
) -> Result<Json<RepairReport>, AppError> {
    let job: RepairJob = job.parse().map_err(AppError::InvalidRequest)?;

    tracing::info!(company = %auth.company_name, job = %job, "repair job requested");

    let report = reconciliation_service::run(&pool, job, Some(auth.company_id)).await?;
    Ok(Json(report))
}
