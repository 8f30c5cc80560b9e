use thiserror::Error;

use crate::message::TransportError;
use crate::orders::StoreError;

/// 启动/运行期错误
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("存储错误: {0}")]
    Storage(#[from] StoreError),

    #[error("消息总线错误: {0}")]
    Transport(#[from] TransportError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部服务器错误: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
