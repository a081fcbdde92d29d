//! HTTP middleware: request ID, API key auth, and rate limiting.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
