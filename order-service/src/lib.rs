//! Order Service - 基于消息总线的订单服务
//!
//! # 架构概述
//!
//! HTTP 层不直接访问存储，所有读写都通过消息总线完成：
//!
//! - **消息总线** (`message`): 内存/TCP 传输、同步请求桥、服务响应器
//! - **订单** (`orders`): redb 存储、随机订单生成、总线上的订单操作
//! - **缓存** (`cache`): 有界 LRU 订单缓存
//! - **HTTP API** (`api`): `/`, `/order/{uid}`, `/order/add`, `/health`
//!
//! # 模块结构
//!
//! ```text
//! order-service/src/
//! ├── core/          # 配置、状态、错误、后台任务
//! ├── api/           # HTTP 路由和处理器
//! ├── cache/         # LRU 缓存
//! ├── message/       # 传输、请求桥、响应器
//! ├── orders/        # 存储、生成器、操作
//! └── utils/         # 日志、HTTP 错误
//! ```

pub mod api;
pub mod cache;
pub mod core;
pub mod message;
pub mod orders;
pub mod utils;

// Re-export 公共类型
pub use cache::OrderCache;
pub use crate::core::{Config, Server, ServerState};
pub use message::{MessageBus, RequestBridge, Responder};
pub use orders::OrderStore;
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger_from_env, init_logger_with_file};
