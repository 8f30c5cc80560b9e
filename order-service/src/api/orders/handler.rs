//! Order API Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use http::StatusCode;
use serde::Deserialize;
use shared::models::Order;

use crate::core::ServerState;
use crate::message::{BridgeError, TopicPair};
use crate::utils::{AppError, AppResult};

/// Body for `POST /order/add`
#[derive(Debug, Deserialize)]
pub struct CreateOrdersRequest {
    #[serde(default = "default_count")]
    pub count: u64,
}

fn default_count() -> u64 {
    2
}

/// Get order by uid (cache first)
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(order_uid): Path<String>,
) -> AppResult<Json<Order>> {
    if let Some(order) = state.cache.get(&order_uid) {
        tracing::debug!(order_uid = %order_uid, "Cache hit");
        return Ok(Json(Order::clone(&order)));
    }

    let order: Order = state
        .bridge
        .request(&order_uid, &TopicPair::get_order_by_id())
        .await?;
    state.cache.add(order.clone());
    Ok(Json(order))
}

/// Create `count` random orders
///
/// The body is optional; an empty request creates two orders.
pub async fn create(
    State(state): State<ServerState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Vec<Order>>)> {
    let count = if body.iter().all(u8::is_ascii_whitespace) {
        default_count()
    } else {
        serde_json::from_slice::<CreateOrdersRequest>(&body)
            .map_err(|e| AppError::validation(format!("invalid request body: {e}")))?
            .count
    };

    let orders: Vec<Order> = state
        .bridge
        .request(&count, &TopicPair::post_order())
        .await
        .map_err(|e| match e {
            // A rejected create is a bad request, not a missing resource
            BridgeError::Remote(reason) => AppError::validation(reason),
            other => AppError::from(other),
        })?;

    for order in &orders {
        state.cache.add(order.clone());
    }
    tracing::info!(count = orders.len(), "Orders created");
    Ok((StatusCode::CREATED, Json(orders)))
}
