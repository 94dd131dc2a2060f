//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, row locking, validation and the
//! ledger, stock and investment invariants.

pub mod investment_service;
pub mod ledger_service;
pub mod purchase_service;
pub mod reconciliation_service;
pub mod sale_service;
pub mod stock_service;
