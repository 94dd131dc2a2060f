//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request and response bodies of the HTTP API.

/// Company (tenant) authenticated by API key
pub mod company;
/// Ledger accounts (cash drawers, bank accounts)
pub mod account;
/// Cash movements with cached running balance
pub mod ledger_entry;
/// Items and their cached stock aggregate
pub mod item;
/// Stock lots, the unit of FIFO consumption
pub mod stock_lot;
/// Purchases (intakes) and their lines
pub mod purchase;
/// Investor attributions of lot quantities
pub mod investment;
/// Sale-close request and result
pub mod sale;
/// Summaries returned by the reconciliation jobs
pub mod report;
