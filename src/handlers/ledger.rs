//! Ledger HTTP handlers.
//!
//! - POST /api/v1/ledger/entries - Append a manual cash movement
//!
//! Sale cash is recognized through the sale-close endpoint and investor
//! payouts through the investor endpoints, never here.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::ledger_entry::{EntrySource, LedgerEntryResponse, ManualEntryRequest, NewLedgerEntry},
    services::ledger_service,
};
use axum::{Extension, Json, extract::State, http::StatusCode};

/// Append a manual entry.
///
/// Payroll and loan workflows pass their own classification in `meta`,
/// e.g. `{"type": "loan"}`.
///
/// # Request Body
///
/// ```json
/// {
///   "account_id": "550e8400-...",
///   "kind": "OUT",
///   "amount": 30000,
///   "meta": { "type": "settlement" }
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the entry with its `balance_after`
/// - **Error (400)**: amount is zero or negative
/// - **Error (404)**: account not found for this company
pub async fn create_manual_entry(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ManualEntryRequest>,
) -> Result<(StatusCode, Json<LedgerEntryResponse>), AppError> {
    let outcome = ledger_service::append_entry(
        &pool,
        NewLedgerEntry {
            company_id: auth.company_id,
            account_id: request.account_id,
            kind: request.kind,
            amount: request.amount,
            source: EntrySource::Manual,
            source_ref: None,
            date: request.date,
            meta: request.meta,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(outcome.entry.into())))
}
