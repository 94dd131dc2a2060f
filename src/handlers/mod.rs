//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls the service layer with the authenticated company
//! 3. Returns HTTP response (JSON, status code)

/// Account management endpoints
pub mod accounts;
/// Service health endpoint
pub mod health;
/// Investor attribution and payout endpoints
pub mod investors;
/// Item and stock lot endpoints
pub mod items;
/// Reconciliation job endpoints
pub mod jobs;
/// Manual ledger entry endpoint
pub mod ledger;
/// Purchase endpoints
pub mod purchases;
/// Sale-close endpoint
pub mod sales;
