//! Order operations served on the bus
//!
//! | Request topic | Payload | Reply value |
//! |---------------|---------|-------------|
//! | `get_order_by_id` | order uid (JSON string) | `Order` |
//! | `post_order` | count (JSON integer or numeric string) | `[Order]` |

use std::sync::Arc;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use shared::models::Order;

use super::generator::random_order;
use super::storage::{OrderStore, StoreError};
use crate::message::{Operation, OperationError, TopicPair};

/// Upper bound on orders generated by one request
pub const MAX_CREATE_BATCH: u64 = 100;

impl From<StoreError> for OperationError {
    fn from(e: StoreError) -> Self {
        OperationError::Store(e.to_string())
    }
}

/// Look up one order by uid
#[derive(Debug, Clone)]
pub struct GetOrderById {
    store: OrderStore,
}

impl GetOrderById {
    pub fn new(store: OrderStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Operation for GetOrderById {
    async fn handle(&self, payload: Value) -> Result<Value, OperationError> {
        let order_uid = parse_order_uid(&payload)?;

        match self.store.find_order_by_id(&order_uid)? {
            Some(order) => {
                tracing::debug!(order_uid = %order_uid, "Order loaded");
                Ok(serde_json::to_value(order)?)
            }
            None => Err(OperationError::not_found(format!(
                "Order {} is not found",
                order_uid
            ))),
        }
    }
}

/// Generate and persist a batch of random orders
#[derive(Debug, Clone)]
pub struct CreateOrders {
    store: OrderStore,
}

impl CreateOrders {
    pub fn new(store: OrderStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Operation for CreateOrders {
    async fn handle(&self, payload: Value) -> Result<Value, OperationError> {
        let count = parse_count(&payload)?;
        let orders = generate(count);

        // Orders inserted before a failure stay persisted
        for order in &orders {
            self.store.insert_order(order).map_err(|e| {
                tracing::error!(order_uid = %order.order_uid, error = %e, "Failed to insert order");
                OperationError::from(e)
            })?;
        }

        tracing::info!(count = orders.len(), "Orders created");
        Ok(serde_json::to_value(orders)?)
    }
}

/// Operations with the topic pair each one serves
pub fn bindings(store: &OrderStore) -> Vec<(TopicPair, Arc<dyn Operation>)> {
    vec![
        (
            TopicPair::get_order_by_id(),
            Arc::new(GetOrderById::new(store.clone())) as Arc<dyn Operation>,
        ),
        (
            TopicPair::post_order(),
            Arc::new(CreateOrders::new(store.clone())) as Arc<dyn Operation>,
        ),
    ]
}

fn generate(count: u64) -> Vec<Order> {
    let mut rng = StdRng::from_entropy();
    (0..count).map(|_| random_order(&mut rng)).collect()
}

/// Order uid from a JSON string; surrounding quotes are tolerated
fn parse_order_uid(payload: &Value) -> Result<String, OperationError> {
    let Value::String(raw) = payload else {
        return Err(OperationError::Decode(format!(
            "expected order uid string, got {}",
            payload
        )));
    };

    let order_uid = raw.trim().trim_matches('"').trim();
    if order_uid.is_empty() {
        return Err(OperationError::validation("order_uid must not be empty"));
    }
    Ok(order_uid.to_string())
}

/// Order count from a JSON integer or numeric string
fn parse_count(payload: &Value) -> Result<u64, OperationError> {
    let count = match payload {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| OperationError::Decode(format!("invalid order count: {}", n)))?,
        Value::String(s) => s
            .trim()
            .trim_matches('"')
            .parse::<i64>()
            .map_err(|e| OperationError::Decode(format!("invalid order count {:?}: {}", s, e)))?,
        other => {
            return Err(OperationError::Decode(format!(
                "expected order count, got {}",
                other
            )));
        }
    };

    if count < 1 || count as u64 > MAX_CREATE_BATCH {
        return Err(OperationError::validation(format!(
            "order count must be between 1 and {}, got {}",
            MAX_CREATE_BATCH, count
        )));
    }
    Ok(count as u64)
}
