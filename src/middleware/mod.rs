//! HTTP middleware components.
//!
//! Middleware run before route handlers. Here they authenticate the caller
//! and attach the company every query is scoped to.

/// API key authentication middleware
pub mod auth;
