//! API 路由模块
//!
//! # 结构
//!
//! - [`index`] - 首页 (接口列表)
//! - [`health`] - 健康检查
//! - [`orders`] - 订单查询/创建接口

pub mod health;
pub mod index;
pub mod orders;

// Re-export common types for handlers
pub use crate::utils::{AppError, AppResult};
