//! Route handlers.

pub mod events;
pub mod health;
pub mod info;
pub mod ingest;
pub mod metrics;
pub mod streams;
