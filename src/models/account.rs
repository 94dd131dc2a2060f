//! Account data models and API request/response types.
//!
//! This module defines:
//! - `Account`: a named cash bucket with an initial balance
//! - `CreateAccountRequest`: request body for creating accounts
//! - `AccountResponse`: account plus its current balance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of cash bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum AccountType {
    Cash,
    Bank,
}

/// Represents an account record from the database.
///
/// # Database Table
///
/// Maps to the `accounts` table. `(company_id, name)` is unique.
///
/// # Balance
///
/// An account never stores its current balance. The balance is the
/// `balance_after` of its latest ledger entry, or `initial_balance` when the
/// account has no entries. `initial_balance` is fixed at creation.
///
/// All amounts are `i64` minor units (cents).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,

    /// Owning company; every lookup filters by it
    pub company_id: Uuid,

    pub name: String,

    pub account_type: AccountType,

    /// Seed of the balance chain
    pub initial_balance: i64,

    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a new account.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "Front desk drawer",
///   "account_type": "CASH",
///   "initial_balance": 50000
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,

    #[serde(default = "default_account_type")]
    pub account_type: AccountType,

    /// Initial balance in cents (defaults to 0 if not provided)
    #[serde(default)]
    pub initial_balance: i64,
}

fn default_account_type() -> AccountType {
    AccountType::Cash
}

/// Response body for account endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "Front desk drawer",
///   "account_type": "CASH",
///   "initial_balance": 50000,
///   "balance": 120000,
///   "active": true,
///   "created_at": "2025-12-20T10:00:00Z",
///   "updated_at": "2025-12-20T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub name: String,
    pub account_type: AccountType,
    pub initial_balance: i64,

    /// Current balance in cents
    pub balance: i64,

    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountResponse {
    /// Combine an account with its current balance (drops `company_id`).
    pub fn new(account: Account, balance: i64) -> Self {
        Self {
            id: account.id,
            name: account.name,
            account_type: account.account_type,
            initial_balance: account.initial_balance,
            balance,
            active: account.active,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Request body for renaming or (de)activating an account.
///
/// Balances are never edited directly; they only move through ledger entries.
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub active: Option<bool>,
}
