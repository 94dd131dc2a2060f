//! Account management HTTP handlers.
//!
//! This module implements the account-related API endpoints:
//! - POST /api/v1/accounts - Create new account
//! - GET /api/v1/accounts - List all accounts of the authenticated company
//! - GET /api/v1/accounts/{id} - Get account with its current balance
//! - PATCH /api/v1/accounts/{id} - Rename or (de)activate an account
//! - GET /api/v1/accounts/{id}/entries - Ledger entries in chain order

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        account::{Account, AccountResponse, CreateAccountRequest, UpdateAccountRequest},
        ledger_entry::LedgerEntryResponse,
    },
    services::ledger_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Create a new account.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Front desk drawer",
///   "account_type": "CASH",
///   "initial_balance": 50000
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the account, balance = initial balance
/// - **Error (400)**: empty name or name already used by this company
pub async fn create_account(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("name is required".to_string()));
    }

    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (company_id, name, account_type, initial_balance)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.company_id)
    .bind(name)
    .bind(request.account_type)
    .bind(request.initial_balance)
    .fetch_one(&pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::InvalidRequest(format!("account {name} already exists"))
        }
        other => AppError::Database(other),
    })?;

    tracing::info!(company = %auth.company_name, account_id = %account.id, "account created");

    let balance = account.initial_balance;
    Ok((StatusCode::CREATED, Json(AccountResponse::new(account, balance))))
}

/// Get a specific account with its current balance.
///
/// Returns 404 if the account doesn't exist OR belongs to another company.
pub async fn get_account(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = fetch_account(&pool, auth.company_id, account_id).await?;
    let balance = ledger_service::current_balance(&pool, auth.company_id, account_id).await?;

    Ok(Json(AccountResponse::new(account, balance)))
}

/// List all accounts of the authenticated company, by name.
pub async fn list_accounts(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<AccountResponse>>, AppError> {
    let accounts = sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE company_id = $1 ORDER BY name ASC",
    )
    .bind(auth.company_id)
    .fetch_all(&pool)
    .await?;

    let mut responses = Vec::with_capacity(accounts.len());
    for account in accounts {
        let balance = ledger_service::current_balance(&pool, auth.company_id, account.id).await?;
        responses.push(AccountResponse::new(account, balance));
    }

    Ok(Json(responses))
}

/// Rename or (de)activate an account. The balance cannot be edited.
pub async fn update_account(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    if request.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::InvalidRequest("name cannot be empty".to_string()));
    }

    let account = sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET name = COALESCE($3, name),
            active = COALESCE($4, active),
            updated_at = NOW()
        WHERE id = $1 AND company_id = $2
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(auth.company_id)
    .bind(request.name.as_deref().map(str::trim))
    .bind(request.active)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::AccountNotFound)?;

    let balance = ledger_service::current_balance(&pool, auth.company_id, account_id).await?;
    Ok(Json(AccountResponse::new(account, balance)))
}

/// List an account's ledger entries, oldest first.
pub async fn list_entries(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEntryResponse>>, AppError> {
    let entries = ledger_service::list_entries(&pool, auth.company_id, account_id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

async fn fetch_account(
    pool: &DbPool,
    company_id: Uuid,
    account_id: Uuid,
) -> Result<Account, AppError> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1 AND company_id = $2")
        .bind(account_id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::AccountNotFound)
}
