//! Shared types for the order bus service
//!
//! Wire types used by every process attached to the bus: the order
//! aggregate, the bus envelope and the reply envelope.

pub mod message;
pub mod models;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{Envelope, Reply};
pub use models::{Delivery, Item, Order, OrderHeader, Payment};
