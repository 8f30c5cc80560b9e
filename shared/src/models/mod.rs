//! Data models
//!
//! Shared between order-service processes (HTTP facade and responders)
//! and carried over the bus as JSON.

pub mod order;

// Re-exports
pub use order::*;
