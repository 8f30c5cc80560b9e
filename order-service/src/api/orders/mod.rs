//! Order API Module
//!
//! Reads hit the cache first; misses and creates go over the bus.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/order", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Generate and persist random orders
        .route("/add", post(handler::create))
        .route("/{order_uid}", get(handler::get_by_id))
}
