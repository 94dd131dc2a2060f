//! Company model used for authentication and tenant scoping.
//!
//! Each company authenticates with an API key. Keys are stored as SHA-256
//! hashes, never in plain text.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a company record from the database.
///
/// # Database Table
///
/// Maps to the `companies` table. Every account, item, lot, purchase and
/// attribution carries the `company_id` of its owner, and every query is
/// filtered by it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Company {
    pub id: Uuid,

    pub name: String,

    /// SHA-256 hash of the API key (64 hex characters)
    pub key_hash: String,

    /// Account investor payouts are drawn from when the caller names none
    pub disbursement_account_id: Option<Uuid>,

    /// Inactive companies are rejected during authentication.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}
