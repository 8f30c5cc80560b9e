//! redb-based order store
//!
//! # Tables
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `orders` | `order_uid` | `OrderHeader` (JSON) |
//! | `deliveries` | `order_uid` | `Delivery` (JSON) |
//! | `payments` | `order_uid` | `Payment` (JSON) |
//! | `items` | `(order_uid, position)` | `Item` (JSON) |
//!
//! An order aggregate is written in a single write transaction across all
//! four tables, so a reader either sees the whole order or none of it.

use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use shared::models::{Delivery, Item, Order, OrderHeader, Payment};
use thiserror::Error;

/// key = order_uid, value = JSON-serialized OrderHeader
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// key = order_uid, value = JSON-serialized Delivery
const DELIVERIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("deliveries");

/// key = order_uid, value = JSON-serialized Payment
const PAYMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");

/// key = (order_uid, position), value = JSON-serialized Item
const ITEMS_TABLE: TableDefinition<(&str, u32), &[u8]> = TableDefinition::new("items");

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Order {0} already exists")]
    AlreadyExists(String),

    #[error("Order {order_uid} is incomplete: missing {part}")]
    Incomplete {
        order_uid: String,
        part: &'static str,
    },

    #[error("Order {0} has too many items")]
    TooManyItems(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Order store backed by redb
#[derive(Clone)]
pub struct OrderStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for OrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStore").finish_non_exhaustive()
    }
}

impl OrderStore {
    /// Open or create the database at the given path
    ///
    /// redb commits are durable once `commit()` returns, the file is always
    /// in a consistent state.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests, ephemeral deployments)
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(DELIVERIES_TABLE)?;
            let _ = write_txn.open_table(PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(ITEMS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Reads ==========

    /// Load a full order aggregate, `None` if the UID is unknown
    pub fn find_order_by_id(&self, order_uid: &str) -> StoreResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;

        let header: OrderHeader = {
            let table = read_txn.open_table(ORDERS_TABLE)?;
            match table.get(order_uid)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Ok(None),
            }
        };

        let delivery: Delivery = read_part(&read_txn, DELIVERIES_TABLE, order_uid, "delivery")?;
        let payment: Payment = read_part(&read_txn, PAYMENTS_TABLE, order_uid, "payment")?;

        let items_table = read_txn.open_table(ITEMS_TABLE)?;
        let mut items = Vec::new();
        for result in items_table.range((order_uid, 0u32)..=(order_uid, u32::MAX))? {
            let (_key, value) = result?;
            let item: Item = serde_json::from_slice(value.value())?;
            items.push(item);
        }

        Ok(Some(Order::assemble(header, delivery, payment, items)))
    }

    pub fn contains(&self, order_uid: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        Ok(table.get(order_uid)?.is_some())
    }

    /// Number of stored orders
    pub fn order_count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        Ok(table.len()?)
    }

    // ========== Writes ==========

    /// Persist an order aggregate (all-or-nothing)
    ///
    /// Fails with [`StoreError::AlreadyExists`] when the UID is taken; the
    /// transaction is dropped uncommitted on every error path.
    pub fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::write_order(&txn, order)?;
        txn.commit()?;

        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order persisted"
        );
        Ok(())
    }

    fn write_order(txn: &WriteTransaction, order: &Order) -> StoreResult<()> {
        let uid = order.order_uid.as_str();
        if order.items.len() > u32::MAX as usize {
            return Err(StoreError::TooManyItems(order.order_uid.clone()));
        }

        let mut orders = txn.open_table(ORDERS_TABLE)?;
        if orders.get(uid)?.is_some() {
            return Err(StoreError::AlreadyExists(order.order_uid.clone()));
        }
        let header = serde_json::to_vec(&order.header())?;
        orders.insert(uid, header.as_slice())?;

        let mut deliveries = txn.open_table(DELIVERIES_TABLE)?;
        let delivery = serde_json::to_vec(&order.delivery)?;
        deliveries.insert(uid, delivery.as_slice())?;

        let mut payments = txn.open_table(PAYMENTS_TABLE)?;
        let payment = serde_json::to_vec(&order.payment)?;
        payments.insert(uid, payment.as_slice())?;

        let mut items = txn.open_table(ITEMS_TABLE)?;
        for (position, item) in order.items.iter().enumerate() {
            let value = serde_json::to_vec(item)?;
            items.insert((uid, position as u32), value.as_slice())?;
        }

        Ok(())
    }
}

/// Read a one-per-order child record that must exist alongside the header
fn read_part<T: serde::de::DeserializeOwned>(
    txn: &ReadTransaction,
    definition: TableDefinition<'static, &'static str, &'static [u8]>,
    order_uid: &str,
    part: &'static str,
) -> StoreResult<T> {
    let table = txn.open_table(definition)?;
    match table.get(order_uid)? {
        Some(value) => Ok(serde_json::from_slice(value.value())?),
        None => Err(StoreError::Incomplete {
            order_uid: order_uid.to_string(),
            part,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::generator::random_order;

    #[test]
    fn test_insert_and_find() {
        let store = OrderStore::open_in_memory().unwrap();
        let order = random_order(&mut rand::thread_rng());

        store.insert_order(&order).unwrap();

        let found = store.find_order_by_id(&order.order_uid).unwrap().unwrap();
        assert_eq!(found, order);
        assert_eq!(store.order_count().unwrap(), 1);
    }

    #[test]
    fn test_find_missing() {
        let store = OrderStore::open_in_memory().unwrap();
        assert!(store.find_order_by_id("missing").unwrap().is_none());
        assert!(!store.contains("missing").unwrap());
    }

    #[test]
    fn test_items_keep_their_order() {
        let store = OrderStore::open_in_memory().unwrap();
        let mut order = random_order(&mut rand::thread_rng());
        let template = order.items[0].clone();
        order.items = (0..12)
            .map(|i| Item {
                chrt_id: i,
                ..template.clone()
            })
            .collect();

        store.insert_order(&order).unwrap();

        let found = store.find_order_by_id(&order.order_uid).unwrap().unwrap();
        let ids: Vec<i64> = found.items.iter().map(|i| i.chrt_id).collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_uid_is_rejected_without_partial_write() {
        let store = OrderStore::open_in_memory().unwrap();
        let original = random_order(&mut rand::thread_rng());
        store.insert_order(&original).unwrap();

        let mut conflicting = random_order(&mut rand::thread_rng());
        conflicting.order_uid = original.order_uid.clone();

        let err = store.insert_order(&conflicting).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(ref uid) if *uid == original.order_uid));

        // The stored aggregate is untouched
        let found = store.find_order_by_id(&original.order_uid).unwrap().unwrap();
        assert_eq!(found, original);
        assert_eq!(store.order_count().unwrap(), 1);
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.redb");
        let order = random_order(&mut rand::thread_rng());

        {
            let store = OrderStore::open(&path).unwrap();
            store.insert_order(&order).unwrap();
        }

        let store = OrderStore::open(&path).unwrap();
        assert_eq!(store.find_order_by_id(&order.order_uid).unwrap(), Some(order));
    }
}
