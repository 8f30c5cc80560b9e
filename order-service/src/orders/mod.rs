//! 订单模块
//!
//! - [`storage`] - redb 持久化
//! - [`operations`] - 总线上提供的订单操作
//! - [`generator`] - 随机订单生成

pub mod generator;
pub mod operations;
pub mod storage;

pub use operations::{CreateOrders, GetOrderById, MAX_CREATE_BATCH, bindings};
pub use storage::{OrderStore, StoreError, StoreResult};
