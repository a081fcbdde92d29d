//! streamforge-core: shared types, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other streamforge
//! crates, providing stream-key handling, a unified error type, application
//! configuration, and a broadcast event bus for stream lifecycle events.

pub mod config;
pub mod error;
pub mod events;
pub mod stream;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use stream::*;
