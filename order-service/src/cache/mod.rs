//! 订单缓存 - 最近最少使用 (LRU) 淘汰
//!
//! Best-effort read accelerator in front of the bus. The authoritative copy
//! of every order lives in the store; a miss here just means a bridge call.
//!
//! [`OrderCache`] is a cheap-clone handle; the LRU map and its ordering list
//! are mutated together under one lock.

mod lru;

pub use lru::{Keys, LruCache};

use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;
use shared::models::Order;

/// Shared order cache keyed by `order_uid`
#[derive(Clone)]
pub struct OrderCache {
    inner: Arc<Mutex<LruCache<String, Arc<Order>>>>,
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OrderCache")
            .field("len", &inner.len())
            .field("capacity", &inner.capacity())
            .finish()
    }
}

impl OrderCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Insert or replace an order, marking it most recently used.
    ///
    /// The order is frozen behind an `Arc`; callers keep their own copy.
    pub fn add(&self, order: Order) -> Arc<Order> {
        let order = Arc::new(order);
        let evicted = {
            let mut inner = self.inner.lock();
            inner.put(order.order_uid.clone(), Arc::clone(&order))
        };

        tracing::debug!(order_uid = %order.order_uid, "Order added to cache");
        if let Some((uid, _)) = evicted {
            tracing::debug!(order_uid = %uid, "Evicted least recently used order");
        }
        order
    }

    /// Look up an order, promoting it to most recently used
    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.inner.lock().get(order_uid).cloned()
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.inner.lock().contains(order_uid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}
