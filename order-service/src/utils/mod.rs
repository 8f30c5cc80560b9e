//! 工具模块 - 通用工具函数和类型
//!
//! - [`AppError`] - HTTP 错误类型
//! - 日志初始化

pub mod error;
pub mod logger;
pub mod result;

pub use error::{AppError, ErrorBody};
pub use result::AppResult;
